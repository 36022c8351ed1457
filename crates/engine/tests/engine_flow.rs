use api_client::error::ApiError;
use api_client::MarketData;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use configuration::{load_config_from_str, Config};
use core_types::{Bar, Decision, Direction, Frequency, Intent, MessageCode, Quote};
use engine::{store, Engine, EngineError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use strategies::{Strategy, StrategyError};

// --- Fakes ---

/// In-memory venue: one price per ticker, lot size 1.
#[derive(Default)]
struct FakeMarket {
    prices: Mutex<HashMap<String, Decimal>>,
    closed: Vec<String>,
    broken: Vec<String>,
    /// Traded today, but without a bar in every minute window.
    daily_only: Vec<String>,
}

impl FakeMarket {
    fn with_prices(prices: &[(&str, Decimal)]) -> Self {
        let market = Self::default();
        for (ticker, price) in prices {
            market.set_price(ticker, *price);
        }
        market
    }

    fn set_price(&self, ticker: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(ticker.to_string(), price);
    }

    fn delist(&self, ticker: &str) {
        self.prices.lock().unwrap().remove(ticker);
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn quote(
        &self,
        ticker: &str,
        start: NaiveDateTime,
        _end: NaiveDateTime,
        frequency: Frequency,
    ) -> Result<Quote, ApiError> {
        if self.broken.iter().any(|t| t == ticker) {
            return Err(ApiError::InvalidData("connection reset".to_string()));
        }
        if self.closed.iter().any(|t| t == ticker) {
            return Ok(Quote::no_data("closed"));
        }
        if frequency == Frequency::Minute && self.daily_only.iter().any(|t| t == ticker) {
            return Ok(Quote::no_data("no trades this minute"));
        }
        match self.prices.lock().unwrap().get(ticker) {
            Some(close) => Ok(Quote::with_bars(Some(1), vec![Bar { timestamp: start, close: *close }])),
            None => Ok(Quote::unknown("not listed")),
        }
    }
}

/// Hands out pre-recorded decisions, one per call, per ticker.
#[derive(Default)]
struct ScriptedStrategy {
    script: HashMap<String, VecDeque<Decision>>,
}

impl ScriptedStrategy {
    fn then(mut self, ticker: &str, decision: Decision) -> Self {
        self.script.entry(ticker.to_string()).or_default().push_back(decision);
        self
    }
}

impl Strategy for ScriptedStrategy {
    fn decide(&mut self, ticker: &str, _history: &[Bar]) -> Result<Decision, StrategyError> {
        Ok(self.script.get_mut(ticker).and_then(VecDeque::pop_front).unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// --- Helpers ---

fn config(tickers: &[&str], start_time: NaiveDateTime) -> Config {
    let tickers = tickers.iter().map(|t| format!("\"{}\"", t)).collect::<Vec<_>>().join(", ");
    load_config_from_str(&format!(
        r#"
        [ledger]
        initial_balance = "100000"

        [portfolio]
        tickers = [{}]

        [schedule]
        start_time = "{}"
        "#,
        tickers,
        start_time.format("%Y-%m-%dT%H:%M:%S")
    ))
    .unwrap()
}

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 9, 15).unwrap().and_hms_opt(11, 0, 0).unwrap()
}

fn buy(quantity: i64) -> Decision {
    Decision { direction: Some(Direction::Buy), quantity: Some(quantity), ..Default::default() }
}

async fn engine(tickers: &[&str], market: Arc<FakeMarket>, strategy: ScriptedStrategy) -> Engine {
    Engine::create(config(tickers, start()), Box::new(strategy), market).await.unwrap()
}

// --- Tests ---

#[tokio::test]
async fn stop_loss_closes_the_position_once() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(120))]));
    let mut engine = engine(&["SBER"], Arc::clone(&market), ScriptedStrategy::default()).await;

    let intent = Intent::new("SBER", Direction::Buy, start()).quantity(10).stop_loss(dec!(115)).take_profit(dec!(130));
    engine.apply(vec![intent], None).await.unwrap();
    let sber = engine.ledger().position("SBER").unwrap();
    assert_eq!(sber.quantity(), 10);
    assert_eq!(sber.price(), dec!(120));
    assert_eq!(sber.stop_loss(), Some(dec!(115)));
    assert_eq!(engine.ledger().free_balance(), dec!(100000) - dec!(1200) - dec!(1.5));

    market.set_price("SBER", dec!(110));
    let marks = HashMap::from([("SBER".to_string(), dec!(110))]);
    let records = engine.check_stop_targets(&marks, None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, -10);
    assert_eq!(engine.ledger().quantity("SBER"), 0);
    assert_eq!(engine.ledger().history().len(), 2);

    // Nothing left to trigger: no new history entry.
    let records = engine.check_stop_targets(&marks, None).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(engine.ledger().history().len(), 2);
}

#[tokio::test]
async fn stop_target_without_executable_price_records_nothing() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(120))]));
    let mut engine = engine(&["SBER"], Arc::clone(&market), ScriptedStrategy::default()).await;
    let intent = Intent::new("SBER", Direction::Buy, start()).quantity(10).stop_loss(dec!(115));
    engine.apply(vec![intent], None).await.unwrap();
    assert_eq!(engine.ledger().history().len(), 1);

    market.delist("SBER");
    let marks = HashMap::from([("SBER".to_string(), dec!(110))]);
    for _ in 0..2 {
        let records = engine.check_stop_targets(&marks, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_filled());
        assert_eq!(engine.ledger().history().len(), 1);
        assert_eq!(engine.ledger().quantity("SBER"), 10);
    }
}

#[tokio::test]
async fn same_ticker_intents_share_one_allocation() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(100))]));
    let mut engine = engine(&["SBER"], market, ScriptedStrategy::default()).await;

    let intents = vec![
        Intent::new("SBER", Direction::Buy, start()),
        Intent::new("SBER", Direction::Buy, start()),
    ];
    let records = engine.apply(intents, None).await.unwrap();

    assert_eq!(records[0].quantity, 1000);
    assert_eq!(records[1].quantity, 0);
    assert_eq!(engine.ledger().quantity("SBER"), 1000);
    assert_eq!(engine.ledger().available("SBER"), Decimal::ZERO);
    // Only the fee may push cash below zero.
    assert_eq!(engine.ledger().free_balance(), dec!(-125));
    assert_eq!(engine.ledger().history().len(), 1);
}

#[tokio::test]
async fn a_second_sell_is_sized_after_the_first_closed_the_holding() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(100))]));
    let mut engine = engine(&["SBER"], market, ScriptedStrategy::default()).await;
    engine.apply(vec![Intent::new("SBER", Direction::Buy, start()).quantity(100)], None).await.unwrap();

    let intents = vec![
        Intent::new("SBER", Direction::Sell, start()).quantity(100),
        Intent::new("SBER", Direction::Sell, start()).quantity(1000),
    ];
    let records = engine.apply(intents, None).await.unwrap();

    assert_eq!(records[0].quantity, -100);
    // The short is capped at 75% of the freed allocation: 0.75 * 100000 / 100.
    assert_eq!(records[1].quantity, -750);
    assert_eq!(engine.ledger().quantity("SBER"), -750);
    let held: Decimal = engine.ledger().positions().values().map(|s| s.value()).sum();
    assert_eq!(engine.ledger().full_balance(), engine.ledger().free_balance() + held);
}

#[tokio::test]
async fn daily_trading_keeps_a_ticker_in_the_tick() {
    let market = Arc::new(FakeMarket {
        daily_only: vec!["MGTS".to_string()],
        ..FakeMarket::with_prices(&[("MGTS", dec!(200))])
    });
    let strategy = ScriptedStrategy::default().then("MGTS", buy(5));
    let mut engine = engine(&["MGTS"], market, strategy).await;

    let report = engine.step().await.unwrap();

    assert!(report.skipped.is_empty());
    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.executed[0].message.code, MessageCode::NoData);
    assert_eq!(engine.ledger().quantity("MGTS"), 0);
}

#[tokio::test]
async fn step_skips_tickers_without_data_and_trades_the_rest() {
    let market = Arc::new(FakeMarket {
        closed: vec!["GAZP".to_string()],
        broken: vec!["MAGN".to_string()],
        ..FakeMarket::with_prices(&[("SBER", dec!(100))])
    });
    let strategy = ScriptedStrategy::default().then("SBER", Decision {
        direction: Some(Direction::Buy),
        ..Default::default()
    });
    let mut engine = engine(&["SBER", "GAZP", "MAGN", "XXXX"], market, strategy).await;

    let report = engine.step().await.unwrap();

    assert_eq!(report.clock, start() + Duration::days(1));
    assert!(!report.terminated);
    // A quarter of the balance at 100 per unit.
    assert_eq!(engine.ledger().quantity("SBER"), 250);
    assert_eq!(report.executed.len(), 1);

    let skipped: HashMap<String, MessageCode> = report.skipped.into_iter().collect();
    assert_eq!(skipped["GAZP"], MessageCode::NoData);
    assert_eq!(skipped["MAGN"], MessageCode::NoData);
    assert_eq!(skipped["XXXX"], MessageCode::UnknownInstrument);

    let entry = engine.ledger().history().last().unwrap();
    assert_eq!(entry.timestamp, start() + Duration::days(1));
    assert_eq!(entry.structure_received.len(), 1);
}

#[tokio::test]
async fn step_checks_stops_against_the_tick_close() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(100))]));
    let strategy = ScriptedStrategy::default().then("SBER", Decision {
        direction: Some(Direction::Buy),
        quantity: Some(10),
        stop_loss: Some(dec!(95)),
        take_profit: Some(dec!(120)),
        ..Default::default()
    });
    let mut engine = engine(&["SBER"], Arc::clone(&market), strategy).await;

    engine.step().await.unwrap();
    assert_eq!(engine.ledger().quantity("SBER"), 10);

    market.set_price("SBER", dec!(125));
    let report = engine.step().await.unwrap();
    assert_eq!(report.triggered.len(), 1);
    assert_eq!(engine.ledger().quantity("SBER"), 0);
    assert_eq!(engine.ledger().position("SBER").unwrap().take_profit(), None);
}

#[tokio::test]
async fn liquidate_flattens_everything_and_terminates() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(100)), ("GAZP", dec!(50))]));
    let strategy = ScriptedStrategy::default()
        .then("SBER", buy(20))
        .then("GAZP", Decision { direction: Some(Direction::Sell), quantity: Some(30), ..Default::default() });
    let mut engine = engine(&["SBER", "GAZP"], Arc::clone(&market), strategy).await;

    engine.step().await.unwrap();
    assert_eq!(engine.ledger().quantity("SBER"), 20);
    assert_eq!(engine.ledger().quantity("GAZP"), -30);

    market.set_price("SBER", dec!(101));
    engine.liquidate(None).await.unwrap();
    assert!(engine.ledger().is_terminated());
    assert_eq!(engine.ledger().open_positions().count(), 0);
    assert_eq!(engine.ledger().full_balance(), engine.ledger().free_balance());

    assert!(matches!(engine.step().await, Err(EngineError::Terminated)));
    let intent = Intent::new("SBER", Direction::Buy, start()).quantity(1);
    assert!(matches!(engine.apply(vec![intent], None).await, Err(EngineError::Terminated)));
}

#[tokio::test]
async fn catching_up_with_the_wall_clock_terminates() {
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(100))]));
    let yesterday = chrono::Local::now().naive_local() - Duration::hours(12);
    let mut engine =
        Engine::create(config(&["SBER"], yesterday), Box::new(ScriptedStrategy::default()), market).await.unwrap();

    let report = engine.step().await.unwrap();
    assert!(report.terminated);
    assert!(matches!(engine.step().await, Err(EngineError::Terminated)));
}

#[tokio::test]
async fn saved_state_resumes_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger_state.json");
    let market = Arc::new(FakeMarket::with_prices(&[("SBER", dec!(33.3333))]));
    let strategy = ScriptedStrategy::default().then("SBER", buy(7));
    let mut engine = engine(&["SBER"], Arc::clone(&market), strategy).await;
    engine.step().await.unwrap();

    store::save(&path, &engine.state()).await.unwrap();
    let state = store::load(&path).await.unwrap().unwrap();
    let restored =
        Engine::restore(config(&["SBER"], start()), state, Box::new(ScriptedStrategy::default()), market).unwrap();

    assert_eq!(restored.clock(), engine.clock());
    assert_eq!(restored.ledger(), engine.ledger());
    assert_eq!(restored.ledger().position("SBER").unwrap().price(), dec!(33.3333));
}

#[tokio::test]
async fn explicit_weights_split_the_balance() {
    let market = Arc::new(FakeMarket::default());
    let mut config = config(&["SBER", "GAZP"], start());
    config.portfolio.weights = Some(vec![dec!(0.25), dec!(0.75)]);
    let engine = Engine::create(config, Box::new(ScriptedStrategy::default()), market).await.unwrap();
    assert_eq!(engine.ledger().available("SBER"), dec!(25000));
    assert_eq!(engine.ledger().available("GAZP"), dec!(75000));
}
