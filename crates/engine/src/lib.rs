//! # Ledgerline Engine
//!
//! The single owner of a `Ledger`. It wires the strategy, the sizing policy,
//! the execution pipeline and the market-data provider together and exposes
//! the four mutating operations: `apply`, `liquidate`, `check_stop_targets`
//! and the scheduling tick `step`.
//!
//! Every mutating operation takes `&mut self`. Quote lookups are the only
//! suspension points and always complete before the ledger is touched.

use api_client::MarketData;
use chrono::{Duration, NaiveDateTime};
use configuration::{Config, Weighting};
use core_types::{Direction, Frequency, Intent, MessageCode, Quote};
use executor::{ExecutionRecord, Executor, HistoryEntry, Ledger, Order, SimulatedExecutor};
use futures::future::join_all;
use risk::{OrderSizer, SizingContext};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use strategies::Strategy;

pub mod error;
pub mod store;

pub use error::EngineError;
pub use store::{EngineState, STATE_SCHEMA_VERSION};

/// What one call to `step` did.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub clock: NaiveDateTime,
    /// Execution records of the strategy batch, including skipped orders.
    pub executed: Vec<ExecutionRecord>,
    /// Execution records of positions closed by stop-loss or take-profit.
    pub triggered: Vec<ExecutionRecord>,
    /// Tickers without data this tick, with the reason.
    pub skipped: Vec<(String, MessageCode)>,
    pub terminated: bool,
}

/// Fetches a quote, turning timeouts and transport failures into "no data".
async fn fetch_quote(
    market: &dyn MarketData,
    ticker: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    frequency: Frequency,
    timeout: std::time::Duration,
) -> Quote {
    match tokio::time::timeout(timeout, market.quote(ticker, start, end, frequency)).await {
        Ok(Ok(quote)) => quote,
        Ok(Err(e)) => {
            tracing::warn!(ticker, error = %e, "Quote lookup failed");
            Quote::no_data(e.to_string())
        }
        Err(_) => {
            tracing::warn!(ticker, ?timeout, "Quote lookup timed out");
            Quote::no_data("quote lookup timed out")
        }
    }
}

pub struct Engine {
    config: Config,
    ledger: Ledger,
    clock: NaiveDateTime,
    strategy: Box<dyn Strategy>,
    market: Arc<dyn MarketData>,
    sizer: OrderSizer,
    executor: SimulatedExecutor,
}

impl Engine {
    /// Assembles an engine around an existing ledger.
    pub fn new(
        config: Config,
        ledger: Ledger,
        clock: NaiveDateTime,
        strategy: Box<dyn Strategy>,
        market: Arc<dyn MarketData>,
    ) -> Result<Self, EngineError> {
        let sizer = OrderSizer::from_settings(&config.ledger)?;
        let executor = SimulatedExecutor::new(config.ledger.exchange_fee_rate);
        Ok(Self { config, ledger, clock, strategy, market, sizer, executor })
    }

    /// Builds a fresh ledger from the configuration, starting the clock at
    /// `schedule.start_time`.
    pub async fn create(
        config: Config,
        strategy: Box<dyn Strategy>,
        market: Arc<dyn MarketData>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let weights = allocation_weights(&config, market.as_ref()).await;
        let ledger = Ledger::from_settings(&config.ledger, &config.portfolio.tickers, &weights)?;
        let clock = config.schedule.start_time;
        Self::new(config, ledger, clock, strategy, market)
    }

    /// Resumes from a persisted state.
    pub fn restore(
        config: Config,
        state: EngineState,
        strategy: Box<dyn Strategy>,
        market: Arc<dyn MarketData>,
    ) -> Result<Self, EngineError> {
        tracing::info!(id = %state.ledger.id(), clock = %state.clock, "Restoring engine state");
        Self::new(config, state.ledger, state.clock, strategy, market)
    }

    /// A serializable snapshot of the ledger and the clock.
    pub fn state(&self) -> EngineState {
        EngineState::new(self.clock, self.ledger.clone())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.market_data.timeout_secs)
    }

    /// Sizes, executes and commits a batch of intents as one history entry.
    ///
    /// The entry is stamped with `timestamp`, else the first intent's
    /// timestamp, else the wall clock.
    pub async fn apply(
        &mut self,
        intents: Vec<Intent>,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        if self.ledger.is_terminated() {
            return Err(EngineError::Terminated);
        }
        self.apply_batch(intents, timestamp, BatchKind::Regular).await
    }

    /// Closes every open position and terminates the ledger.
    pub async fn liquidate(
        &mut self,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        self.ledger.terminate();
        let timestamp = timestamp.unwrap_or(self.clock);
        let intents: Vec<Intent> = self
            .ledger
            .open_positions()
            .map(|(ticker, state)| {
                Intent::new(ticker, Direction::closing(state.quantity()), timestamp)
                    .quantity(state.quantity().abs())
                    .comment("liquidation")
            })
            .collect();
        tracing::info!(positions = intents.len(), %timestamp, "Liquidating ledger");
        self.apply_batch(intents, Some(timestamp), BatchKind::Liquidation).await
    }

    /// Closes positions whose stop-loss or take-profit has been crossed.
    ///
    /// `marks` supplies the latest price per ticker; a ticker without a mark is
    /// judged by its weighted-average price. Writes nothing when no position
    /// triggers or when none of the closing orders could be executed, so
    /// calling it twice in a row is harmless.
    pub async fn check_stop_targets(
        &mut self,
        marks: &HashMap<String, Decimal>,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        if self.ledger.is_terminated() {
            return Err(EngineError::Terminated);
        }
        let breaches = self.ledger.stop_target_breaches(marks);
        if breaches.is_empty() {
            return Ok(Vec::new());
        }

        let timestamp = timestamp.unwrap_or(self.clock);
        let intents = breaches
            .into_iter()
            .map(|(ticker, quantity)| {
                Intent::new(&ticker, Direction::closing(quantity), timestamp)
                    .quantity(quantity.abs())
                    .comment("stop/target")
            })
            .collect();
        self.apply_batch(intents, Some(timestamp), BatchKind::StopTarget).await
    }

    /// The scheduling tick.
    ///
    /// Advances the clock by `step_days`, asks the strategy about every ticker
    /// whose venue has data, applies the decisions as one batch and then checks
    /// stops and targets against this tick's closes. Terminates the ledger once
    /// the clock catches up with the wall clock.
    pub async fn step(&mut self) -> Result<StepReport, EngineError> {
        if self.ledger.is_terminated() {
            return Err(EngineError::Terminated);
        }
        let schedule = self.config.schedule.clone();
        self.clock += Duration::days(schedule.step_days);
        let clock = self.clock;
        let tick_end = clock + Duration::days(1);
        let timeout = self.timeout();
        let market = Arc::clone(&self.market);
        let tickers = self.ledger.tickers().to_vec();

        // --- Is the venue open today? One daily lookup per ticker ---
        let tick_quotes = join_all(tickers.iter().map(|ticker| {
            fetch_quote(market.as_ref(), ticker, clock, tick_end, Frequency::Day, timeout)
        }))
        .await;

        let mut skipped = Vec::new();
        let mut marks = HashMap::new();
        let mut open = Vec::new();
        for (ticker, quote) in tickers.iter().zip(&tick_quotes) {
            match quote.last_close().filter(|_| quote.ok) {
                Some(close) => {
                    marks.insert(ticker.clone(), close);
                    open.push(ticker.clone());
                }
                None => {
                    tracing::debug!(ticker = %ticker, reason = %quote.message, "No tick data");
                    skipped.push((ticker.clone(), quote.message_code()));
                }
            }
        }

        // --- Lookback windows for the open venues ---
        let lookback_start = clock - Duration::days(schedule.lookback_days);
        let lookbacks = join_all(open.iter().map(|ticker| {
            fetch_quote(market.as_ref(), ticker, lookback_start, clock, Frequency::Day, timeout)
        }))
        .await;

        let mut intents = Vec::new();
        for (ticker, lookback) in open.iter().zip(lookbacks) {
            if !lookback.has_data() {
                skipped.push((ticker.clone(), lookback.message_code()));
                continue;
            }
            match self.strategy.decide(ticker, &lookback.bars) {
                Ok(decision) if decision.direction() != Direction::Nothing => {
                    intents.push(decision.into_intent(ticker, clock));
                }
                Ok(_) => {}
                Err(e) => tracing::error!(ticker = %ticker, error = %e, "Strategy failed, skipping ticker"),
            }
        }

        let executed = self.apply_batch(intents, Some(clock), BatchKind::Regular).await?;
        let triggered = self.check_stop_targets(&marks, Some(clock)).await?;

        if clock >= chrono::Local::now().naive_local() {
            self.ledger.terminate();
        }

        tracing::info!(
            %clock,
            executed = executed.iter().filter(|r| r.is_filled()).count(),
            triggered = triggered.iter().filter(|r| r.is_filled()).count(),
            skipped = skipped.len(),
            full_balance = %self.ledger.full_balance(),
            "Step complete"
        );
        Ok(StepReport { clock, executed, triggered, skipped, terminated: self.ledger.is_terminated() })
    }

    /// Shared by every mutating operation: fetch, size, execute, commit.
    async fn apply_batch(
        &mut self,
        intents: Vec<Intent>,
        timestamp: Option<NaiveDateTime>,
        kind: BatchKind,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        let timestamp = timestamp.or_else(|| intents.first().map(|i| i.timestamp));
        let intents: Vec<Intent> = intents.into_iter().filter(|i| i.direction != Direction::Nothing).collect();

        let window = Duration::minutes(self.config.schedule.execution_window_minutes);
        let frequency = self.config.schedule.execution_frequency;
        let timeout = self.timeout();
        let market = Arc::clone(&self.market);
        let quotes = join_all(intents.iter().map(|intent| {
            fetch_quote(market.as_ref(), &intent.ticker, intent.timestamp, intent.timestamp + window, frequency, timeout)
        }))
        .await;

        // Each intent is sized against the ledger plus the fills staged before it.
        let mut staged: HashMap<String, (i64, Decimal)> = HashMap::new();
        let mut records = Vec::with_capacity(intents.len());
        let mut fills = Vec::new();
        for (intent, quote) in intents.iter().zip(&quotes) {
            let (held, available) = *staged
                .entry(intent.ticker.clone())
                .or_insert_with(|| (self.ledger.quantity(&intent.ticker), self.ledger.available(&intent.ticker)));
            let context = SizingContext {
                held,
                available,
                price: intent.price.or_else(|| quote.last_close()),
                liquidating: kind == BatchKind::Liquidation,
            };
            let amount = self.sizer.size(intent.direction, intent.quantity, &context);
            let order = Order { ticker: intent.ticker.clone(), direction: intent.direction, amount, price: intent.price };
            let record = self.executor.execute(&order, quote);

            if !record.is_filled() {
                tracing::info!(
                    ticker = %intent.ticker,
                    code = record.message.code.code(),
                    reason = %record.message.text,
                    "Nothing executed"
                );
            }
            if let Some(fill) = record.clone().into_fill(intent.stop_loss, intent.take_profit)? {
                staged.insert(intent.ticker.clone(), (held + fill.quantity, available - fill.value()));
                fills.push(fill);
            }
            records.push(record);
        }

        if kind == BatchKind::StopTarget && fills.is_empty() {
            tracing::debug!(orders = records.len(), "No stop/target order executed, nothing recorded");
            return Ok(records);
        }
        let entry: &HistoryEntry = match kind {
            BatchKind::Liquidation => self.ledger.apply_closing(&fills, timestamp)?,
            BatchKind::Regular | BatchKind::StopTarget => self.ledger.apply(&fills, timestamp)?,
        };
        tracing::debug!(sequence = entry.sequence, fills = fills.len(), "Batch committed");
        Ok(records)
    }
}

/// Which operation a batch belongs to; decides sizing and how it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    /// Strategy decisions and manual intents. Always recorded, even when empty.
    Regular,
    /// Positions closed by stop-loss or take-profit. Recorded only when something filled.
    StopTarget,
    /// Closing trades after termination, sized with the liquidation buffer.
    Liquidation,
}

/// Capital weights per ticker, in the order of `portfolio.tickers`.
async fn allocation_weights(config: &Config, market: &dyn MarketData) -> Vec<Decimal> {
    let tickers = &config.portfolio.tickers;
    if let Some(weights) = &config.portfolio.weights {
        return weights.clone();
    }
    if config.portfolio.weighting == Weighting::Equal {
        return risk::equal_weights(tickers.len());
    }

    let end = config.schedule.start_time;
    let start = end - Duration::days(config.portfolio.allocation_lookback_days);
    let timeout = std::time::Duration::from_secs(config.market_data.timeout_secs);
    let quotes = join_all(
        tickers.iter().map(|ticker| fetch_quote(market, ticker, start, end, Frequency::Day, timeout)),
    )
    .await;

    let mut history = Vec::with_capacity(tickers.len());
    for (ticker, quote) in tickers.iter().zip(quotes) {
        if !quote.has_data() {
            tracing::warn!(ticker = %ticker, "No history for inverse-variance weights, using equal weights");
            return risk::equal_weights(tickers.len());
        }
        history.push((ticker.clone(), quote.bars.iter().map(|bar| bar.close).collect()));
    }

    match risk::inverse_variance_weights(&history) {
        Ok(weights) => weights,
        Err(e) => {
            tracing::warn!(error = %e, "Inverse-variance weights failed, using equal weights");
            risk::equal_weights(tickers.len())
        }
    }
}
