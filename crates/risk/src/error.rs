use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Cannot compute allocation weights: {0}")]
    Allocation(String),

    #[error("Price history of {ticker} has zero variance")]
    ZeroVariance { ticker: String },

    #[error("Weights sum to {0}, which cannot be normalised")]
    DegenerateWeights(Decimal),
}
