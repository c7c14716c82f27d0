use btcbot::api::{Exchange, UpbitClient};
use btcbot::db::TradeLedger;
use btcbot::news::{self, NewsFeed};
use btcbot::performance::LedgerReport;
use btcbot::{CycleOutcome, Result, Settings, Trader};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "btcbot")]
#[command(about = "LLM-assisted KRW-BTC trading bot", long_about = None)]
struct Cli {
    /// TOML settings file (defaults to ./btcbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one trading cycle
    Run,
    /// Create the trade ledger and apply migrations
    InitDb,
    /// Summarise the trade ledger
    Report {
        /// Only include trades from the last N days
        #[arg(short, long)]
        days: Option<i64>,
    },
    /// Fetch and print the latest headlines
    News,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(&settings).await,
        Command::InitDb => init_db(&settings).await,
        Command::Report { days } => report(&settings, days).await,
        Command::News => fetch_news(&settings).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("btcbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(settings: &Settings) -> Result<()> {
    tracing::info!("🚀 btcbot starting ({})", settings.exchange.market);
    tracing::info!("  Model: {}", settings.llm.model);
    tracing::info!("  Min order: {:.0} KRW", settings.trading.min_order_krw);
    tracing::info!("  Reflection: {}", settings.llm.reflection_enabled);

    let trader = Trader::from_settings(settings).await?;

    match trader.run_cycle().await {
        CycleOutcome::Completed {
            trade_id,
            decision,
            executed,
        } => tracing::info!(
            "👋 Done: trade #{} {} {}% (executed: {})",
            trade_id,
            decision.action,
            decision.confidence,
            executed
        ),
        CycleOutcome::Aborted { reason } => tracing::warn!("👋 Done without a trade: {}", reason),
        CycleOutcome::Skipped => tracing::warn!("👋 Another cycle was running"),
    }

    Ok(())
}

async fn init_db(settings: &Settings) -> Result<()> {
    TradeLedger::connect(&settings.database.url).await?;
    tracing::info!("✅ Trade ledger ready at {}", settings.database.url);
    Ok(())
}

async fn report(settings: &Settings, days: Option<i64>) -> Result<()> {
    let ledger = TradeLedger::connect(&settings.database.url).await?;
    let trades = match days {
        Some(days) => ledger.recent_trades(days).await?,
        None => ledger.all_trades().await?,
    };

    let client = UpbitClient::with_base_url(
        &settings.exchange.base_url,
        settings.exchange.access_key.clone(),
        settings.exchange.secret_key.clone(),
    )?;
    let spot = match client.current_price(&settings.exchange.market).await {
        Ok(price) => price,
        Err(e) => {
            // Fall back to the price recorded with the newest trade
            tracing::warn!("⚠️  Spot price unavailable ({:#}), using last recorded price", e);
            trades
                .iter()
                .max_by_key(|t| (t.timestamp, t.id))
                .map_or(0.0, |t| t.btc_krw_price)
        }
    };

    LedgerReport::from_trades(&trades, spot).print_summary();
    Ok(())
}

async fn fetch_news(settings: &Settings) -> Result<()> {
    let feed = NewsFeed::from_config(&settings.news)?;
    let articles = feed.refresh(Utc::now()).await?;

    println!("{}", news::headline_summary(&articles));
    Ok(())
}
