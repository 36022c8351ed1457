//! # Ledgerline Risk
//!
//! Decides how much money may go into a single trade, and how the starting
//! balance is split between tickers.
//!
//! - `sizing`: the order-sizing policy. Pure, never fails: insufficient capital
//!   clamps the amount to zero or to the leverage ceiling.
//! - `allocation`: equal, explicit and inverse-variance capital weights.

pub mod allocation;
pub mod error;
pub mod sizing;

pub use allocation::{equal_weights, inverse_variance_weights, normalize_weights};
pub use error::RiskError;
pub use sizing::{OrderSizer, SizingContext};
