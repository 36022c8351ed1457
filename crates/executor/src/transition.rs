use core_types::{Fill, StateSnapshot};
use rust_decimal::Decimal;

/// The effect of folding one fill into a position, computed before anything is committed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub next: StateSnapshot,
    /// Change of free cash, excluding the fee.
    pub cash_delta: Decimal,
}

/// Combines the current position with an executed trade.
///
/// - Same direction (or flat): quantities add up and the price becomes the
///   weighted average. Incoming stop and target replace the old ones.
/// - Opposite direction, partial close: the remaining position keeps its price,
///   stop and target.
/// - Opposite direction, full close or flip (including an exact offset): the
///   incoming price, stop and target apply to whatever is left.
///
/// A zero resulting quantity always resets the price to 0.
pub fn fold(current: &StateSnapshot, fill: &Fill) -> Transition {
    let incoming_value = fill.value();
    let quantity = current.quantity + fill.quantity;

    let same_direction = current.quantity == 0 || current.quantity.signum() == fill.quantity.signum();

    let next = if same_direction {
        let price = if quantity != 0 {
            (current.value() + incoming_value) / Decimal::from(quantity)
        } else {
            Decimal::ZERO
        };
        StateSnapshot { quantity, price, stop_loss: fill.stop_loss, take_profit: fill.take_profit }
    } else if current.quantity.unsigned_abs() > fill.quantity.unsigned_abs() {
        StateSnapshot { quantity, ..*current }
    } else {
        StateSnapshot { quantity, price: fill.price, stop_loss: fill.stop_loss, take_profit: fill.take_profit }
    };

    let next = if next.quantity == 0 { StateSnapshot::default() } else { next };

    Transition { next, cash_delta: -incoming_value }
}
