use chrono::NaiveDateTime;
use core_types::Frequency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ledger: LedgerSettings,
    pub portfolio: PortfolioSettings,
    pub schedule: Schedule,
    #[serde(default)]
    pub market_data: MarketDataSettings,
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub logging: Logging,
}

/// Money and risk parameters of the ledger.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Starting free balance, in the venue's currency.
    pub initial_balance: Decimal,
    /// Fraction of a ticker's allocation that may back a short beyond the held size.
    /// Must lie in (0, 1].
    #[serde(default = "default_leverage_cap")]
    pub leverage_cap: Decimal,
    /// Simulated exchange fee as a fraction of traded value. 0.00125 is 0.125%.
    #[serde(default = "default_exchange_fee_rate")]
    pub exchange_fee_rate: Decimal,
    /// Price fraction added to the sizing cap while liquidating, to absorb slippage.
    #[serde(default = "default_liquidation_buffer")]
    pub liquidation_buffer: Decimal,
}

fn default_leverage_cap() -> Decimal {
    dec!(0.75)
}

fn default_exchange_fee_rate() -> Decimal {
    dec!(0.00125)
}

fn default_liquidation_buffer() -> Decimal {
    dec!(0.99)
}

/// How capital is split across tickers when no explicit weights are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Equal,
    /// Weights proportional to the inverse variance of mean-normalised closes.
    InverseVariance,
}

/// Which instruments the ledger trades and how much of the balance each gets.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioSettings {
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    /// One weight per ticker, non-negative, summing to exactly 1.
    #[serde(default)]
    pub weights: Option<Vec<Decimal>>,
    #[serde(default)]
    pub weighting: Weighting,
    /// Daily history used for inverse-variance weights.
    #[serde(default = "default_allocation_lookback_days")]
    pub allocation_lookback_days: i64,
}

/// Constituents of the MOEX Russia index the system was built around.
pub const DEFAULT_TICKERS: [&str; 6] = ["GAZP", "GLTR", "MAGN", "MGTS", "SBER", "TATN"];

fn default_tickers() -> Vec<String> {
    DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect()
}

fn default_allocation_lookback_days() -> i64 {
    365 * 3
}

/// The logical clock driving `step`.
#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    /// First point on the logical clock. The first `step` moves past it.
    pub start_time: NaiveDateTime,
    #[serde(default = "default_step_days")]
    pub step_days: i64,
    /// Length of the price history handed to the strategy.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Bar frequency used to resolve execution prices.
    #[serde(default = "default_execution_frequency")]
    pub execution_frequency: Frequency,
    /// Width of the execution price window after the intent's timestamp.
    #[serde(default = "default_execution_window_minutes")]
    pub execution_window_minutes: i64,
}

fn default_step_days() -> i64 {
    1
}

fn default_lookback_days() -> i64 {
    50
}

fn default_execution_frequency() -> Frequency {
    Frequency::Minute
}

fn default_execution_window_minutes() -> i64 {
    1
}

/// Connection parameters for the MOEX ISS REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default = "default_board")]
    pub board: String,
    /// A request slower than this is treated as "no data".
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://iss.moex.com/iss".to_string()
}

fn default_engine() -> String {
    "stock".to_string()
}

fn default_market() -> String {
    "shares".to_string()
}

fn default_board() -> String {
    "TQBR".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            engine: default_engine(),
            market: default_market(),
            board: default_board(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Identifies which strategy implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    #[default]
    MacdConservative,
}

/// Contains the selected strategy and the parameter sets for all strategies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategySettings {
    #[serde(default)]
    pub id: StrategyId,
    #[serde(default)]
    pub macd: MacdParams,
}

/// Parameters for the conservative MACD strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct MacdParams {
    pub short_period: usize,
    pub long_period: usize,
    /// Smoothing period of the MACD line.
    pub signal_period: usize,
    /// Moving average used to size the stop/target band.
    pub ma_period: usize,
    /// Fraction of the distance to the moving average used for stop and target.
    pub band_factor: Decimal,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            short_period: 12,
            long_period: 26,
            signal_period: 4,
            ma_period: 60,
            band_factor: dec!(0.75),
        }
    }
}

/// Where the ledger is persisted between CLI invocations.
#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub state_path: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self { state_path: PathBuf::from("ledger_state.json") }
    }
}

/// Log output settings. Console logging is always on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    /// Directory for a daily rolling log file. `None` disables file logging.
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
}
