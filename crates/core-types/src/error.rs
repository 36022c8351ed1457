use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("Ticker must not be empty")]
    EmptyTicker,

    #[error("Price for {ticker} must be positive, got {price}")]
    InvalidPrice { ticker: String, price: Decimal },

    #[error("Fee for {ticker} must not be negative, got {fee}")]
    InvalidFee { ticker: String, fee: Decimal },
}
