use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Price {price} of {ticker} cannot be converted for indicator math")]
    UnrepresentablePrice { ticker: String, price: String },
}
