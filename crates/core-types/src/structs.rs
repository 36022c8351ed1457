use crate::enums::{Direction, MessageCode};
use crate::error::CoreError;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single closing price reported by the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub close: Decimal,
}

/// The provider's answer for one ticker and time window.
///
/// `ok == false` means the venue does not know the instrument. `ok == true`
/// with no bars means there was nothing traded in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ok: bool,
    pub lot_size: Option<u32>,
    pub bars: Vec<Bar>,
    pub message: String,
}

impl Quote {
    pub fn unknown(message: impl Into<String>) -> Self {
        Self { ok: false, lot_size: None, bars: Vec::new(), message: message.into() }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self { ok: true, lot_size: None, bars: Vec::new(), message: message.into() }
    }

    pub fn with_bars(lot_size: Option<u32>, bars: Vec<Bar>) -> Self {
        Self { ok: true, lot_size, bars, message: String::new() }
    }

    /// The most recent close in the window, if any.
    pub fn last_close(&self) -> Option<Decimal> {
        self.bars.last().map(|bar| bar.close)
    }

    pub fn has_data(&self) -> bool {
        self.ok && !self.bars.is_empty()
    }

    /// Classifies the quote the way execution records report it.
    pub fn message_code(&self) -> MessageCode {
        if !self.ok {
            MessageCode::UnknownInstrument
        } else if self.bars.is_empty() {
            MessageCode::NoData
        } else {
            MessageCode::Filled
        }
    }
}

/// What a strategy decided for one ticker on one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Decision {
    pub direction: Option<Direction>,
    pub quantity: Option<i64>,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub comment: Option<String>,
}

impl Decision {
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn direction(&self) -> Direction {
        self.direction.unwrap_or(Direction::Nothing)
    }

    /// Attaches the decision to a ticker and a point on the logical clock.
    pub fn into_intent(self, ticker: &str, timestamp: NaiveDateTime) -> Intent {
        Intent {
            ticker: ticker.to_uppercase(),
            direction: self.direction(),
            quantity: self.quantity,
            price: self.price,
            timestamp,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            comment: self.comment,
        }
    }
}

/// A request to trade, before it has been sized or priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub ticker: String,
    pub direction: Direction,
    /// Explicit number of units; `None` lets sizing use the ticker's allocation.
    pub quantity: Option<i64>,
    /// Explicit price; `None` resolves the market price.
    pub price: Option<Decimal>,
    pub timestamp: NaiveDateTime,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub comment: Option<String>,
}

impl Intent {
    pub fn new(ticker: &str, direction: Direction, timestamp: NaiveDateTime) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            direction,
            quantity: None,
            price: None,
            timestamp,
            stop_loss: None,
            take_profit: None,
            comment: None,
        }
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// An executed trade, ready to be folded into the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub ticker: String,
    /// Signed: positive buys, negative sells.
    pub quantity: i64,
    pub price: Decimal,
    pub fee: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl Fill {
    pub fn new(ticker: &str, quantity: i64, price: Decimal) -> Result<Self, CoreError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(CoreError::EmptyTicker);
        }
        if price <= Decimal::ZERO {
            return Err(CoreError::InvalidPrice { ticker, price });
        }
        Ok(Self {
            ticker,
            quantity,
            price,
            fee: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
        })
    }

    pub fn with_fee(mut self, fee: Decimal) -> Result<Self, CoreError> {
        if fee.is_sign_negative() && !fee.is_zero() {
            return Err(CoreError::InvalidFee { ticker: self.ticker, fee });
        }
        self.fee = fee;
        Ok(self)
    }

    pub fn with_triggers(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    /// `quantity * price`, signed like the quantity.
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
