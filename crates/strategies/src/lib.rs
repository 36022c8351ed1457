//! # Ledgerline Strategy Library
//!
//! Strategies turn a window of closing prices into a `Decision` for one
//! ticker. They know nothing about the ledger, sizing or execution: the engine
//! attaches the decision to the logical clock and sizes it against the
//! ticker's allocation.
//!
//! Adding a strategy means a new module implementing `Strategy`, a new
//! `StrategyId` variant in `configuration` and a new arm in `create_strategy`.

pub mod error;
pub mod factory;
pub mod macd_conservative;

pub use error::StrategyError;
pub use factory::create_strategy;
pub use macd_conservative::MacdConservative;

use core_types::{Bar, Decision};

/// The interface the engine uses to ask for trading decisions.
///
/// `&mut self` lets a strategy keep state between ticks; `Send + Sync` lets the
/// engine hold it behind a `Box` across await points.
pub trait Strategy: Send + Sync {
    /// Decides what to do with `ticker` given its recent closes, oldest first.
    ///
    /// Returns `Decision::nothing()` when there is no signal.
    fn decide(&mut self, ticker: &str, history: &[Bar]) -> Result<Decision, StrategyError>;

    /// A short name for logs and the CLI.
    fn name(&self) -> &'static str;
}
