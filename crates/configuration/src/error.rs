use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Initial balance must not be negative, got {0}")]
    InvalidBalance(Decimal),

    #[error("Invalid portfolio weights: {0}")]
    InvalidWeights(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
