use crate::error::RiskError;
use configuration::LedgerSettings;
use core_types::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the sizing policy needs to know about one ticker at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingContext {
    /// Signed quantity currently held.
    pub held: i64,
    /// The ticker's remaining capital allocation.
    pub available: Decimal,
    /// Resolved price; `None` when the market gave no price.
    pub price: Option<Decimal>,
    /// Set while the ledger is being liquidated.
    pub liquidating: bool,
}

/// The order-sizing policy: turns a direction and an optional quantity into a
/// monetary amount the execution pipeline may spend.
#[derive(Debug, Clone)]
pub struct OrderSizer {
    leverage_cap: Decimal,
    liquidation_buffer: Decimal,
}

impl OrderSizer {
    pub fn new(leverage_cap: Decimal, liquidation_buffer: Decimal) -> Result<Self, RiskError> {
        if leverage_cap <= Decimal::ZERO || leverage_cap > Decimal::ONE {
            return Err(RiskError::InvalidParameters(format!(
                "leverage_cap must lie in (0, 1], got {}",
                leverage_cap
            )));
        }
        if liquidation_buffer.is_sign_negative() && !liquidation_buffer.is_zero() {
            return Err(RiskError::InvalidParameters(
                "liquidation_buffer must not be negative".to_string(),
            ));
        }
        Ok(Self { leverage_cap, liquidation_buffer })
    }

    pub fn from_settings(settings: &LedgerSettings) -> Result<Self, RiskError> {
        Self::new(settings.leverage_cap, settings.liquidation_buffer)
    }

    /// The amount of money that may be traded. Always non-negative.
    pub fn size(&self, direction: Direction, requested: Option<i64>, ctx: &SizingContext) -> Decimal {
        let Some(price) = ctx.price.filter(|p| *p > Decimal::ZERO) else {
            return Decimal::ZERO;
        };
        // An overdrawn allocation backs nothing.
        let available = ctx.available.max(Decimal::ZERO);

        let amount = match direction {
            Direction::Buy => self.size_buy(requested, price, available, ctx.liquidating),
            Direction::Sell => self.size_sell(requested, price, available, ctx),
            Direction::Nothing => Decimal::ZERO,
        };

        tracing::debug!(?direction, ?requested, held = ctx.held, %available, %price, %amount, "Sized order");
        amount.max(Decimal::ZERO)
    }

    fn size_buy(&self, requested: Option<i64>, price: Decimal, available: Decimal, liquidating: bool) -> Decimal {
        let Some(quantity) = requested else {
            return available;
        };
        let mut cap = price * Decimal::from(quantity.unsigned_abs());
        if liquidating {
            cap += price * self.liquidation_buffer;
        }
        available.min(cap)
    }

    fn size_sell(&self, requested: Option<i64>, price: Decimal, available: Decimal, ctx: &SizingContext) -> Decimal {
        let quantity = match requested {
            Some(q) => Decimal::from(q.unsigned_abs()),
            None => (available / price).floor(),
        };
        let leveraged = available * self.leverage_cap;
        let held = Decimal::from(ctx.held);

        let mut amount = if ctx.held >= 0 {
            let excess = quantity - held;
            if excess <= Decimal::ZERO {
                quantity * price
            } else {
                // Everything held, plus a short capped by the leverage ceiling.
                held * price + (excess * price).min(leveraged)
            }
        } else {
            (quantity * price).min(leveraged)
        };

        if ctx.liquidating {
            amount = amount.abs() + price * self.liquidation_buffer;
        }
        amount.abs()
    }
}
