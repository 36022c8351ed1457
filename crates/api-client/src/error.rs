use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build or send the HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The ISS request for {ticker} returned status {status}")]
    Status { ticker: String, status: u16 },

    #[error("Failed to deserialize the ISS response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from ISS: {0}")]
    InvalidData(String),
}
