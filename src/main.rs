use anyhow::{Context, bail};
use api_client::{MarketData, MoexClient};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use configuration::{Config, Logging, load_config};
use core_types::{Direction, Intent};
use engine::{Engine, EngineState, StepReport, store};
use executor::{ExecutionRecord, Ledger};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategies::create_strategy;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// The main entry point for the Ledgerline paper-trading application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; it only carries LEDGERLINE__* overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    // Keep the guard alive so buffered log lines reach the file on exit.
    let _guard = init_logging(&config.logging);

    match cli.command {
        Commands::Run(args) => handle_run(config, args).await,
        Commands::Step => handle_step(config).await,
        Commands::Trade(args) => handle_trade(config, args).await,
        Commands::Liquidate => handle_liquidate(config).await,
        Commands::Status => handle_status(&config).await,
        Commands::History(args) => handle_history(&config, args).await,
    }
}

fn init_logging(settings: &Logging) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false);

    match &settings.directory {
        Some(directory) => {
            let prefix = settings.file_prefix.as_deref().unwrap_or("ledgerline.log");
            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);
            tracing_subscriber::registry().with(filter).with(console).with(file).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A paper-trading ledger driven by a MACD strategy on MOEX market data.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Step the logical clock repeatedly until it reaches today.
    Run(RunArgs),
    /// Advance the logical clock by one step.
    Step,
    /// Submit a single manual trade at the current logical time.
    Trade(TradeArgs),
    /// Close every open position and terminate the ledger.
    Liquidate,
    /// Show balances and open positions.
    Status,
    /// Show the most recent history entries.
    History(HistoryArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Stop after this many steps even if the clock has not caught up.
    #[arg(long)]
    steps: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Buy,
    Sell,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Buy,
            Side::Sell => Direction::Sell,
        }
    }
}

#[derive(Parser)]
struct TradeArgs {
    /// The instrument to trade (e.g., "SBER").
    #[arg(long)]
    ticker: String,

    #[arg(long, value_enum)]
    side: Side,

    /// Units to trade. Without it the whole allocation is used.
    #[arg(long)]
    quantity: Option<i64>,

    /// Limit price. Without it the venue's close is used.
    #[arg(long)]
    price: Option<Decimal>,

    #[arg(long)]
    stop_loss: Option<Decimal>,

    #[arg(long)]
    take_profit: Option<Decimal>,
}

#[derive(Parser)]
struct HistoryArgs {
    /// Number of entries to show.
    #[arg(long, default_value_t = 10)]
    last: usize,

    /// Print the entries as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Engine Bootstrap
// ==============================================================================

/// Resumes the saved engine, or builds a fresh one from the configuration.
async fn open_engine(config: Config) -> anyhow::Result<Engine> {
    let market: Arc<dyn MarketData> = Arc::new(MoexClient::new(&config.market_data)?);
    let strategy = create_strategy(&config.strategy)?;
    let path = config.storage.state_path.clone();

    let engine = match store::load(&path).await? {
        Some(state) => Engine::restore(config, state, strategy, market)?,
        None => {
            tracing::info!(path = %path.display(), "No saved state, creating a new ledger");
            Engine::create(config, strategy, market).await?
        }
    };
    Ok(engine)
}

async fn persist(engine: &Engine) -> anyhow::Result<()> {
    let path = &engine.config().storage.state_path;
    store::save(path, &engine.state())
        .await
        .with_context(|| format!("failed to save state to {}", path.display()))
}

async fn load_state(path: &Path) -> anyhow::Result<EngineState> {
    match store::load(path).await? {
        Some(state) => Ok(state),
        None => bail!("no saved state at {}; run `step` or `run` first", path.display()),
    }
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_run(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let mut engine = open_engine(config).await?;
    if engine.ledger().is_terminated() {
        bail!("ledger {} is terminated", engine.ledger().id());
    }

    let step_days = engine.config().schedule.step_days.max(1);
    let remaining = (chrono::Local::now().naive_local() - engine.clock()).num_days().max(0) / step_days + 1;
    let total = args.steps.unwrap_or(remaining as u64);

    let progress_bar = ProgressBar::new(total);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut filled = 0usize;
    for _ in 0..total {
        let report = engine.step().await?;
        persist(&engine).await?;
        filled += count_filled(&report);
        progress_bar.set_message(format!("{} | balance {}", report.clock, engine.ledger().full_balance().round_dp(2)));
        progress_bar.inc(1);
        if report.terminated {
            break;
        }
    }
    progress_bar.finish_with_message("done");

    println!("Executed {} trades.", filled);
    print_status(engine.clock(), engine.ledger());
    Ok(())
}

async fn handle_step(config: Config) -> anyhow::Result<()> {
    let mut engine = open_engine(config).await?;
    let report = engine.step().await?;
    persist(&engine).await?;

    println!("Clock advanced to {}.", report.clock);
    for (ticker, code) in &report.skipped {
        println!("  {} skipped (code {})", ticker, code.code());
    }
    print_records(report.executed.iter().chain(&report.triggered));
    if report.terminated {
        println!("The clock caught up with today; the ledger is now terminated.");
    }
    Ok(())
}

async fn handle_trade(config: Config, args: TradeArgs) -> anyhow::Result<()> {
    let mut engine = open_engine(config).await?;

    let mut intent = Intent::new(&args.ticker.to_uppercase(), args.side.into(), engine.clock()).comment("manual");
    if let Some(quantity) = args.quantity {
        intent = intent.quantity(quantity);
    }
    if let Some(price) = args.price {
        intent = intent.price(price);
    }
    if let Some(stop_loss) = args.stop_loss {
        intent = intent.stop_loss(stop_loss);
    }
    if let Some(take_profit) = args.take_profit {
        intent = intent.take_profit(take_profit);
    }

    let records = engine.apply(vec![intent], None).await?;
    persist(&engine).await?;
    print_records(records.iter());
    Ok(())
}

async fn handle_liquidate(config: Config) -> anyhow::Result<()> {
    let mut engine = open_engine(config).await?;
    let records = engine.liquidate(None).await?;
    persist(&engine).await?;

    print_records(records.iter());
    print_status(engine.clock(), engine.ledger());
    Ok(())
}

async fn handle_status(config: &Config) -> anyhow::Result<()> {
    let state = load_state(&config.storage.state_path).await?;
    print_status(state.clock, &state.ledger);
    Ok(())
}

async fn handle_history(config: &Config, args: HistoryArgs) -> anyhow::Result<()> {
    let state = load_state(&config.storage.state_path).await?;
    let entries = state.ledger.history().tail(args.last);

    if args.json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Timestamp", "Balance", "Received", "Open after"]);
    for entry in entries {
        let received = entry
            .structure_received
            .iter()
            .map(|(ticker, fill)| format!("{} {:+} @ {}", ticker, fill.quantity, fill.price))
            .collect::<Vec<_>>()
            .join("\n");
        let open_after = entry.structure_after.values().filter(|s| !s.is_flat()).count();
        table.add_row(vec![
            entry.sequence.to_string(),
            entry.timestamp.to_string(),
            entry.balance.round_dp(2).to_string(),
            received,
            open_after.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Output
// ==============================================================================

fn count_filled(report: &StepReport) -> usize {
    report.executed.iter().chain(&report.triggered).filter(|r| r.is_filled()).count()
}

fn print_records<'a>(records: impl Iterator<Item = &'a ExecutionRecord>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Ticker", "Code", "Quantity", "Lots", "Price", "Fee", "Message"]);
    let mut rows = 0;
    for record in records {
        table.add_row(vec![
            record.ticker.clone(),
            record.message.code.code().to_string(),
            record.quantity.to_string(),
            record.lot_quantity.to_string(),
            record.market_price.map_or_else(|| "-".to_string(), |p| p.to_string()),
            record.fee.round_dp(4).to_string(),
            record.message.text.clone(),
        ]);
        rows += 1;
    }
    if rows == 0 {
        println!("No orders.");
    } else {
        println!("{table}");
    }
}

fn print_status(clock: chrono::NaiveDateTime, ledger: &Ledger) {
    println!("Ledger {}", ledger.id());
    println!("  clock:        {}", clock);
    println!("  free balance: {}", ledger.free_balance().round_dp(2));
    println!("  full balance: {}", ledger.full_balance().round_dp(2));
    println!("  leverage cap: {}", ledger.leverage_cap());
    println!("  terminated:   {}", ledger.is_terminated());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Ticker", "Quantity", "Avg price", "Stop", "Target", "Value", "Available"]);
    for ticker in ledger.tickers() {
        let (quantity, price, stop, target, value) = match ledger.position(ticker) {
            Some(state) => (
                state.quantity(),
                state.price().round_dp(4),
                state.stop_loss(),
                state.take_profit(),
                state.value().round_dp(2),
            ),
            None => (0, Decimal::ZERO, None, None, Decimal::ZERO),
        };
        table.add_row(vec![
            ticker.clone(),
            quantity.to_string(),
            price.to_string(),
            stop.map_or_else(|| "-".to_string(), |p| p.to_string()),
            target.map_or_else(|| "-".to_string(), |p| p.to_string()),
            value.to_string(),
            ledger.available(ticker).round_dp(2).to_string(),
        ]);
    }
    println!("{table}");
}
