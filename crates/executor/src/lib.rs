//! # Ledgerline Executor Crate
//!
//! Trade execution and ledger state management.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** `transition::fold` and the `Executor` are pure
//!   calculators. They decide what a trade does to a position, or how many units a
//!   sized order buys at the venue, without touching state. The `Ledger` is the
//!   state machine that commits their results.
//! - **Single Commit Point:** `Ledger::apply` folds a whole batch of fills, recomputes
//!   the mark-to-market balance from scratch and appends exactly one history entry.
//!   A fill is never half-applied. After termination only `Ledger::apply_closing`
//!   remains open, and it accepts nothing but trades towards flat.
//!
//! ## Public API
//!
//! - `Executor` / `SimulatedExecutor`: lot rounding, price resolution and fees.
//! - `Ledger`: positions, balances, per-ticker allocation and the terminated flag.
//! - `HistoryLog` / `HistoryEntry`: the append-only audit trail.
//! - `fold`: the position-transition algorithm.

pub mod error;
pub mod exchange;
pub mod history;
pub mod ledger;
pub mod transition;

pub use error::ExecutorError;
pub use exchange::{DataMessage, ExecutionRecord, Executor, Order, SimulatedExecutor};
pub use history::{HistoryEntry, HistoryLog, Structure, HISTORY_SCHEMA_VERSION};
pub use ledger::Ledger;
pub use transition::{fold, Transition};
