use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of fractional digits kept for weighted-average prices.
pub const PRICE_SCALE: u32 = 16;

/// Rounds a price to the ledger's fixed precision.
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp(PRICE_SCALE).normalize()
}

/// A history-free view of one instrument's position.
///
/// This is the shape stored in audit structures. It is `Copy`, so a snapshot
/// can never alias the live `SecurityState` it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub quantity: i64,
    pub price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl StateSnapshot {
    /// `quantity * price`: signed, negative for a short position.
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

/// The current position in one instrument plus every state it went through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityState {
    quantity: i64,
    price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    history: Vec<StateSnapshot>,
}

impl Default for SecurityState {
    fn default() -> Self {
        Self::new(0, Decimal::ZERO)
    }
}

impl SecurityState {
    pub fn new(quantity: i64, price: Decimal) -> Self {
        Self::with_triggers(quantity, price, None, None)
    }

    pub fn with_triggers(
        quantity: i64,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        let mut state = Self {
            quantity,
            price: round_price(price),
            stop_loss,
            take_profit,
            history: Vec::new(),
        };
        state.history.push(state.snapshot());
        state
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Weighted-average cost basis, not the last market price.
    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn stop_loss(&self) -> Option<Decimal> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<Decimal> {
        self.take_profit
    }

    /// Every state this position has been in, oldest first.
    pub fn history(&self) -> &[StateSnapshot] {
        &self.history
    }

    pub fn value(&self) -> Decimal {
        self.snapshot().value()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Returns the current state without its history.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            quantity: self.quantity,
            price: self.price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
        }
    }

    /// Replaces the current state and appends it to the history.
    ///
    /// A flat position never carries a price or trigger levels.
    pub fn update(&mut self, next: StateSnapshot) {
        if next.quantity == 0 {
            self.quantity = 0;
            self.price = Decimal::ZERO;
            self.stop_loss = None;
            self.take_profit = None;
        } else {
            self.quantity = next.quantity;
            self.price = round_price(next.price);
            self.stop_loss = next.stop_loss;
            self.take_profit = next.take_profit;
        }
        self.history.push(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_state_is_flat_with_one_history_entry() {
        let state = SecurityState::default();
        assert!(state.is_flat());
        assert_eq!(state.price(), Decimal::ZERO);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn update_appends_history_and_keeps_older_entries() {
        let mut state = SecurityState::with_triggers(1, dec!(2), Some(dec!(3)), Some(dec!(4)));
        state.update(StateSnapshot {
            quantity: 5,
            price: dec!(6),
            stop_loss: Some(dec!(3)),
            take_profit: Some(dec!(4)),
        });

        assert_eq!(state.quantity(), 5);
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[0].quantity, 1);
        assert_eq!(state.history()[1].price, dec!(6));
    }

    #[test]
    fn flattening_clears_price_and_triggers() {
        let mut state = SecurityState::with_triggers(10, dec!(100), Some(dec!(90)), Some(dec!(120)));
        state.update(StateSnapshot {
            quantity: 0,
            price: dec!(140),
            stop_loss: Some(dec!(90)),
            take_profit: Some(dec!(120)),
        });

        assert_eq!(state.price(), Decimal::ZERO);
        assert_eq!(state.stop_loss(), None);
        assert_eq!(state.take_profit(), None);
    }

    #[test]
    fn price_is_rounded_to_sixteen_digits() {
        let state = SecurityState::new(3, dec!(340) / dec!(3));
        assert_eq!(state.price(), dec!(113.3333333333333333));
        assert_eq!(state.price().scale(), PRICE_SCALE);
    }

    #[test]
    fn snapshot_does_not_track_later_updates() {
        let mut state = SecurityState::new(10, dec!(100));
        let snapshot = state.snapshot();
        state.update(StateSnapshot { quantity: 20, price: dec!(105), ..Default::default() });

        assert_eq!(snapshot.quantity, 10);
        assert_eq!(snapshot.value(), dec!(1000));
        assert_eq!(state.value(), dec!(2100));
    }
}
