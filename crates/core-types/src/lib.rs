//! # Ledgerline Core Types
//!
//! The shared vocabulary of the workspace: positions, intents, fills and the
//! market-data shapes every other crate speaks in. This crate has no logic
//! beyond small constructors and classifications.

pub mod enums;
pub mod error;
pub mod security;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{Direction, Frequency, MessageCode};
pub use error::CoreError;
pub use security::{round_price, SecurityState, StateSnapshot, PRICE_SCALE};
pub use structs::{Bar, Decision, Fill, Intent, Quote};
