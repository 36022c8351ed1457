use core_types::{CoreError, Direction, Fill, MessageCode, Quote};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// A sized order: the money the sizing policy allows, not yet a unit count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub ticker: String,
    pub direction: Direction,
    /// Monetary amount to trade. Non-negative.
    pub amount: Decimal,
    /// Explicit price from the intent; `None` takes the last close of the quote.
    pub price: Option<Decimal>,
}

/// Classifies how an execution went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    pub code: MessageCode,
    pub text: String,
}

impl DataMessage {
    fn from_quote(quote: &Quote) -> Self {
        let code = quote.message_code();
        let text = match code {
            MessageCode::Filled => "filled".to_string(),
            MessageCode::NoData if quote.message.is_empty() => {
                "no data, the market is probably closed".to_string()
            }
            MessageCode::UnknownInstrument if quote.message.is_empty() => {
                "instrument is not traded on this venue".to_string()
            }
            _ => quote.message.clone(),
        };
        Self { code, text }
    }
}

/// The outcome of executing one order. Produces no side effects by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub message: DataMessage,
    pub ticker: String,
    /// `None` when no price could be resolved.
    pub market_price: Option<Decimal>,
    /// Signed executed units, a whole multiple of the lot size.
    pub quantity: i64,
    pub lot_quantity: i64,
    pub fee: Decimal,
}

impl ExecutionRecord {
    fn skipped(ticker: &str, message: DataMessage) -> Self {
        Self {
            message,
            ticker: ticker.to_string(),
            market_price: None,
            quantity: 0,
            lot_quantity: 0,
            fee: Decimal::ZERO,
        }
    }

    /// Whether this record changes the ledger at all.
    pub fn is_filled(&self) -> bool {
        self.message.code == MessageCode::Filled && self.quantity != 0
    }

    /// Turns a filled record into a `Fill`. Unfilled records yield `None`.
    pub fn into_fill(
        self,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Option<Fill>, CoreError> {
        if !self.is_filled() {
            return Ok(None);
        }
        let Some(price) = self.market_price else {
            return Ok(None);
        };
        let fill = Fill::new(&self.ticker, self.quantity, price)?
            .with_fee(self.fee)?
            .with_triggers(stop_loss, take_profit);
        Ok(Some(fill))
    }
}

/// Turns a sized order into executed units at a venue.
///
/// Implementations calculate the trade but never touch the ledger; the caller
/// folds the resulting record into it.
pub trait Executor: Send + Sync {
    fn execute(&self, order: &Order, quote: &Quote) -> ExecutionRecord;
}

/// The simulated venue: fills at the resolved price, rounded down to whole lots.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    fee_rate: Decimal,
}

impl SimulatedExecutor {
    pub fn new(fee_rate: Decimal) -> Self {
        Self { fee_rate }
    }

    /// `|quantity * price| * fee_rate`.
    pub fn fee(&self, quantity: i64, price: Decimal) -> Decimal {
        (Decimal::from(quantity) * price).abs() * self.fee_rate
    }
}

impl Executor for SimulatedExecutor {
    fn execute(&self, order: &Order, quote: &Quote) -> ExecutionRecord {
        let message = DataMessage::from_quote(quote);
        if message.code != MessageCode::Filled {
            tracing::warn!(ticker = %order.ticker, code = message.code.code(), reason = %message.text, "Order skipped");
            return ExecutionRecord::skipped(&order.ticker, message);
        }

        let Some(price) = order.price.or_else(|| quote.last_close()).filter(|p| *p > Decimal::ZERO) else {
            let message = DataMessage { code: MessageCode::NoData, text: "no usable price".to_string() };
            return ExecutionRecord::skipped(&order.ticker, message);
        };

        let lot_size = i64::from(quote.lot_size.unwrap_or(1).max(1));
        let units = (order.amount.max(Decimal::ZERO) / price).floor().to_i64().unwrap_or(0);
        let lots = units / lot_size;
        let quantity = order.direction.sign() * lots * lot_size;
        let fee = self.fee(quantity, price);

        tracing::debug!(
            ticker = %order.ticker,
            amount = %order.amount,
            %price,
            lot_size,
            lots,
            quantity,
            %fee,
            "Order executed"
        );

        ExecutionRecord {
            message,
            ticker: order.ticker.clone(),
            market_price: Some(price),
            quantity,
            lot_quantity: lots,
            fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::Bar;
    use rust_decimal_macros::dec;

    fn quote(close: Decimal, lot_size: u32) -> Quote {
        let timestamp = NaiveDate::from_ymd_opt(2022, 9, 16).unwrap().and_hms_opt(11, 0, 0).unwrap();
        Quote::with_bars(Some(lot_size), vec![Bar { timestamp, close }])
    }

    fn order(direction: Direction, amount: Decimal) -> Order {
        Order { ticker: "SBER".to_string(), direction, amount, price: None }
    }

    fn executor() -> SimulatedExecutor {
        SimulatedExecutor::new(dec!(0.00125))
    }

    #[test]
    fn exactly_one_lot_fills() {
        let record = executor().execute(&order(Direction::Buy, dec!(1000)), &quote(dec!(100), 10));
        assert_eq!(record.lot_quantity, 1);
        assert_eq!(record.quantity, 10);
        assert_eq!(record.fee, dec!(1.25));
        assert!(record.is_filled());
    }

    #[test]
    fn one_unit_short_of_a_lot_fills_nothing() {
        let record = executor().execute(&order(Direction::Buy, dec!(999.99)), &quote(dec!(100), 10));
        assert_eq!(record.lot_quantity, 0);
        assert_eq!(record.quantity, 0);
        assert!(!record.is_filled());
    }

    #[test]
    fn sells_are_negative_and_fees_positive() {
        let record = executor().execute(&order(Direction::Sell, dec!(2550)), &quote(dec!(100), 10));
        assert_eq!(record.quantity, -20);
        assert_eq!(record.fee, dec!(2.5));
    }

    #[test]
    fn explicit_price_overrides_the_close() {
        let mut o = order(Direction::Buy, dec!(1000));
        o.price = Some(dec!(50));
        let record = executor().execute(&o, &quote(dec!(100), 1));
        assert_eq!(record.market_price, Some(dec!(50)));
        assert_eq!(record.quantity, 20);
    }

    #[test]
    fn missing_data_and_unknown_instruments_are_classified() {
        let record = executor().execute(&order(Direction::Buy, dec!(1000)), &Quote::no_data(""));
        assert_eq!(record.message.code, MessageCode::NoData);
        assert_eq!(record.quantity, 0);

        let record = executor().execute(&order(Direction::Buy, dec!(1000)), &Quote::unknown(""));
        assert_eq!(record.message.code.code(), 2);
        assert_eq!(record.into_fill(None, None).unwrap(), None);
    }

    #[test]
    fn filled_record_becomes_fill_with_triggers() {
        let record = executor().execute(&order(Direction::Buy, dec!(1000)), &quote(dec!(100), 1));
        let fill = record.into_fill(Some(dec!(95)), Some(dec!(110))).unwrap().unwrap();
        assert_eq!(fill.quantity, 10);
        assert_eq!(fill.fee, dec!(1.25));
        assert_eq!(fill.stop_loss, Some(dec!(95)));
    }
}
