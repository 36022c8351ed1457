use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] executor::ExecutorError),

    #[error("Invalid trade: {0}")]
    Trade(#[from] core_types::CoreError),

    #[error("The ledger has been liquidated; no further trading is accepted")]
    Terminated,

    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("State file has schema version {found}, expected {expected}")]
    UnsupportedStateVersion { found: u32, expected: u32 },
}
