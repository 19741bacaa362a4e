use ai_trader::api::AdvisoryClient;
use ai_trader::broker::{Broker, HttpBroker, PaperBroker};
use ai_trader::config::{PolicyKind, Settings};
use ai_trader::execution::{Journal, JournalEntry, JournalStats};
use ai_trader::scheduler::{run_scheduler, SchedulerExit};
use ai_trader::strategy::{AdvisoryPolicy, RulePolicy, SignalPolicy};
use ai_trader::TradingSession;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ai-trader")]
#[command(about = "Multi-timeframe trading controller with rule-based and advisory signal policies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop
    Run {
        /// Settings file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Keep orders in memory instead of sending them to the broker
        #[arg(long)]
        paper: bool,

        /// Override the configured signal policy
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Win/loss statistics from the trade journal
    Stats {
        #[arg(short, long)]
        journal: Option<PathBuf>,
    },

    /// Print the most recent journal records
    Tail {
        #[arg(short, default_value = "20")]
        n: usize,

        #[arg(short, long)]
        journal: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            paper,
            policy,
            once,
        } => run(config, paper, policy, once).await,
        Commands::Stats { journal } => stats(journal),
        Commands::Tail { n, journal } => tail(n, journal),
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ai_trader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_broker(settings: &Settings) -> anyhow::Result<Arc<dyn Broker>> {
    let bridge = HttpBroker::new(
        &settings.broker.url,
        Duration::from_secs(settings.broker.timeout_secs),
    )
    .context("failed to create broker client")?;

    if settings.broker.paper {
        tracing::info!(
            "📝 Paper trading on {} (balance {:.2})",
            settings.broker.url,
            settings.broker.paper_balance
        );
        Ok(Arc::new(PaperBroker::with_feed(
            settings.broker.paper_balance,
            Arc::new(bridge),
        )))
    } else {
        tracing::info!("🔌 Live broker bridge at {}", settings.broker.url);
        Ok(Arc::new(bridge))
    }
}

fn create_policy(settings: &Settings) -> anyhow::Result<Box<dyn SignalPolicy>> {
    match settings.policy {
        PolicyKind::Rules => Ok(Box::new(RulePolicy::new())),
        PolicyKind::Advisory => {
            let client = AdvisoryClient::new(&settings.advisory)?;
            Ok(Box::new(AdvisoryPolicy::new(client, settings.display_decimals)))
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(
    config: Option<PathBuf>,
    paper: bool,
    policy: Option<PolicyKind>,
    once: bool,
) -> anyhow::Result<()> {
    let mut settings = Settings::load(config.as_deref())?;
    if paper {
        settings.broker.paper = true;
    }
    if let Some(policy) = policy {
        settings.policy = policy;
    }

    tracing::info!("🚀 AI Trader starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Instruments: {}", settings.instruments.join(", "));
    tracing::info!("  Policy: {:?}", settings.policy);
    tracing::info!(
        "  Timeframes: fast {} / slow {}",
        settings.fast_timeframe,
        settings.slow_timeframe
    );
    tracing::info!("  Cycle: every {}s", settings.cycle_interval_secs);
    tracing::info!("  Max Drawdown: {}%", settings.max_drawdown_pct);
    tracing::info!("  Journal: {}", settings.journal_path);

    let broker = create_broker(&settings)?;
    let policy = create_policy(&settings)?;
    let mut session = TradingSession::new(&settings, broker, policy);

    let max_cycles = once.then_some(1);
    let exit = run_scheduler(
        &mut session,
        Duration::from_secs(settings.cycle_interval_secs),
        max_cycles,
    )
    .await;

    tracing::info!("👋 AI Trader stopped ({:?})", exit);
    if exit == SchedulerExit::Halted {
        anyhow::bail!("trading halted by the equity guard");
    }
    Ok(())
}

fn journal_at(path: Option<PathBuf>) -> anyhow::Result<Journal> {
    match path {
        Some(path) => Ok(Journal::new(path)),
        None => Ok(Journal::new(Settings::load(None)?.journal_path)),
    }
}

fn stats(path: Option<PathBuf>) -> anyhow::Result<()> {
    let journal = journal_at(path)?;
    let records = journal
        .read_all()
        .with_context(|| format!("failed to read {}", journal.path().display()))?;
    let stats = JournalStats::from_records(&records);

    println!("Journal: {}", journal.path().display());
    println!("Closed trades: {}", stats.total_trades);
    println!("Wins: {}", stats.wins);
    println!("Losses: {}", stats.losses);
    println!("Win rate: {:.1}%", stats.win_rate_pct);
    Ok(())
}

fn tail(n: usize, path: Option<PathBuf>) -> anyhow::Result<()> {
    let journal = journal_at(path)?;
    for record in journal.tail(n)? {
        let instrument = record.instrument.as_deref().unwrap_or("-");
        let line = match &record.entry {
            JournalEntry::Decision {
                action,
                original_action,
                confidence,
                outcome,
                ..
            } => match original_action {
                Some(original) => format!(
                    "DECISION {} (was {}) conf {:.2}: {}",
                    action, original, confidence, outcome
                ),
                None => format!("DECISION {} conf {:.2}: {}", action, confidence, outcome),
            },
            JournalEntry::Order {
                direction,
                volume,
                entry_price,
                ticket,
                ..
            } => format!(
                "ORDER #{} {} {} @ {}",
                ticket,
                direction.as_str(),
                volume,
                entry_price
            ),
            JournalEntry::TradeResult {
                ticket,
                open_price,
                close_price,
                diff,
                ..
            } => format!(
                "TRADE_RESULT #{} {} -> {} diff {:+.5}",
                ticket, open_price, close_price, diff
            ),
            JournalEntry::Halt {
                drawdown_pct,
                limit_pct,
            } => format!("HALT drawdown {:.2}% >= {:.2}%", drawdown_pct, limit_pct),
        };

        println!(
            "{} [{}] {}: {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.cycle,
            instrument,
            line
        );
    }
    Ok(())
}
