use crate::error::ConfigError;
use config::{Environment, File, FileFormat};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    Config, LedgerSettings, Logging, MacdParams, MarketDataSettings, PortfolioSettings, Schedule,
    Storage, StrategyId, StrategySettings, Weighting, DEFAULT_TICKERS,
};

/// Prefix for environment overrides, e.g. `LEDGERLINE__LEDGER__LEVERAGE_CAP=0.5`.
pub const ENV_PREFIX: &str = "LEDGERLINE";

/// Upper bound for every day-count setting, keeping clock arithmetic in range.
pub const MAX_DAYS: i64 = 36_500;

/// Loads and validates the application configuration.
///
/// Values from the TOML file at `path` are overridden by `LEDGERLINE__*`
/// environment variables. The result is validated before it is returned, so
/// a ledger is never built from an invalid configuration.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("__").separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(path = %path.display(), tickers = ?config.portfolio.tickers, "Configuration loaded");
    Ok(config)
}

/// Parses and validates a configuration from a TOML string.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Rejects configurations a ledger cannot be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ledger = &self.ledger;
        if ledger.initial_balance.is_sign_negative() && !ledger.initial_balance.is_zero() {
            return Err(ConfigError::InvalidBalance(ledger.initial_balance));
        }
        if ledger.leverage_cap <= Decimal::ZERO || ledger.leverage_cap > Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "leverage_cap must lie in (0, 1], got {}",
                ledger.leverage_cap
            )));
        }
        if ledger.exchange_fee_rate.is_sign_negative() && !ledger.exchange_fee_rate.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "exchange_fee_rate must not be negative, got {}",
                ledger.exchange_fee_rate
            )));
        }
        if ledger.liquidation_buffer.is_sign_negative() && !ledger.liquidation_buffer.is_zero() {
            return Err(ConfigError::ValidationError(
                "liquidation_buffer must not be negative".to_string(),
            ));
        }

        validate_tickers(&self.portfolio.tickers)?;
        if let Some(weights) = &self.portfolio.weights {
            validate_weights(&self.portfolio.tickers, weights)?;
        }
        if !(2..=MAX_DAYS).contains(&self.portfolio.allocation_lookback_days) {
            return Err(ConfigError::ValidationError(format!(
                "allocation_lookback_days must lie in 2..={}",
                MAX_DAYS
            )));
        }

        let schedule = &self.schedule;
        if !(1..=MAX_DAYS).contains(&schedule.step_days) {
            return Err(ConfigError::ValidationError(format!("step_days must lie in 1..={}", MAX_DAYS)));
        }
        if !(1..=MAX_DAYS).contains(&schedule.lookback_days) {
            return Err(ConfigError::ValidationError(format!("lookback_days must lie in 1..={}", MAX_DAYS)));
        }
        if !(1..=24 * 60).contains(&schedule.execution_window_minutes) {
            return Err(ConfigError::ValidationError(
                "execution_window_minutes must lie in 1..=1440".to_string(),
            ));
        }

        let macd = &self.strategy.macd;
        if macd.short_period == 0 || macd.signal_period == 0 || macd.ma_period == 0 {
            return Err(ConfigError::ValidationError("MACD periods must be positive".to_string()));
        }
        if macd.short_period >= macd.long_period {
            return Err(ConfigError::ValidationError(
                "MACD short_period must be less than long_period".to_string(),
            ));
        }

        if self.market_data.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Tickers must be non-empty, unique and not blank. Comparison is case-insensitive.
pub fn validate_tickers(tickers: &[String]) -> Result<(), ConfigError> {
    if tickers.is_empty() {
        return Err(ConfigError::ValidationError("at least one ticker is required".to_string()));
    }
    let mut seen = HashSet::new();
    for ticker in tickers {
        let normalized = ticker.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(ConfigError::ValidationError("tickers must not be blank".to_string()));
        }
        if !seen.insert(normalized.clone()) {
            return Err(ConfigError::ValidationError(format!("duplicate ticker {}", normalized)));
        }
    }
    Ok(())
}

/// Weights must match the tickers one to one, be non-negative and sum to exactly 1.
pub fn validate_weights(tickers: &[String], weights: &[Decimal]) -> Result<(), ConfigError> {
    if weights.len() != tickers.len() {
        return Err(ConfigError::InvalidWeights(format!(
            "expected {} weights, got {}",
            tickers.len(),
            weights.len()
        )));
    }
    if let Some(negative) = weights.iter().find(|w| w.is_sign_negative() && !w.is_zero()) {
        return Err(ConfigError::InvalidWeights(format!("weight {} is negative", negative)));
    }
    let total: Decimal = weights.iter().sum();
    if total != Decimal::ONE {
        return Err(ConfigError::InvalidWeights(format!("weights sum to {}, not 1", total)));
    }
    Ok(())
}
