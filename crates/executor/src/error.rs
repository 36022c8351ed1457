use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("The ledger cannot be built from this configuration: {0}")]
    InvalidConfiguration(String),

    #[error("The ledger has been terminated; only closing trades are accepted")]
    Terminated,

    #[error("Fill of {quantity} {ticker} does not reduce the held position of {held}")]
    NotClosing { ticker: String, quantity: i64, held: i64 },
}
