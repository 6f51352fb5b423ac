use clap::{Parser, Subcommand};
use signalbot::analysis::MultiTimeframeAnalyzer;
use signalbot::api::HttpCandleClient;
use signalbot::config::Settings;
use signalbot::db::{PostgresStore, DEFAULT_USER_ID};
use signalbot::engine::StrategyEngine;
use signalbot::feed::{BroadcastTickFeed, RedisTickBridge};
use signalbot::models::Timeframe;
use signalbot::persistence::RedisCandleStore;
use signalbot::store::{CandleSource, MemoryStore, SignalStore, StrategyStore};
use signalbot::Result;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "signalbot", version, about = "Real-time strategy evaluation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate strategies against the live tick feed until Ctrl+C
    Run,
    /// Print a multi-timeframe analysis report as JSON
    Analyze {
        #[arg(long)]
        symbol: String,
        #[arg(long, value_delimiter = ',', default_value = "5m,15m,1h,1d")]
        timeframes: Vec<Timeframe>,
    },
    /// Insert the example strategy if no default strategy exists
    Seed {
        #[arg(long)]
        user: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let settings = Settings::load()?;
    setup_logging(&settings.log_filter);

    match cli.command {
        Command::Run => run(settings).await,
        Command::Analyze { symbol, timeframes } => analyze(settings, &symbol, &timeframes).await,
        Command::Seed { user } => seed(settings, user).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(settings: Settings) -> Result<()> {
    tracing::info!("🚀 signalbot starting");

    let (strategies, signals) = connect_strategy_stores(&settings).await?;
    let candles = connect_candle_source(&settings).await?;
    let feed = Arc::new(BroadcastTickFeed::new(settings.feed_capacity));

    let bridge = match &settings.redis_url {
        Some(url) => {
            let bridge = RedisTickBridge::new(
                url,
                settings.tick_channel.as_str(),
                settings.tick_event.as_str(),
                feed.clone(),
            )?;
            Some(tokio::spawn(async move {
                if let Err(e) = bridge.run().await {
                    tracing::error!("Tick bridge stopped: {}", e);
                }
            }))
        }
        None => {
            tracing::warn!("No Redis configured, tick feed has no publisher");
            None
        }
    };

    let engine = StrategyEngine::new(
        strategies,
        signals,
        candles,
        feed,
        settings.engine_config(),
        settings.analyzer_config(),
    );

    if let Some(user) = settings.default_user_id {
        engine.seed(user).await?;
    }

    engine.start().await?;
    tracing::info!("✓ Engine running with {} strategies, Ctrl+C to stop", engine.cache().len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    engine.stop().await;
    if let Some(bridge) = bridge {
        bridge.abort();
    }

    Ok(())
}

async fn analyze(settings: Settings, symbol: &str, timeframes: &[Timeframe]) -> Result<()> {
    let candles = connect_candle_source(&settings).await?;
    let analyzer = MultiTimeframeAnalyzer::new(candles, settings.analyzer_config());

    let report = analyzer.analyze(symbol, timeframes).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn seed(settings: Settings, user: Option<Uuid>) -> Result<()> {
    let user = user.or(settings.default_user_id).unwrap_or(DEFAULT_USER_ID);
    let (strategies, signals) = connect_strategy_stores(&settings).await?;
    let candles: Arc<dyn CandleSource> = Arc::new(MemoryStore::new());
    let feed = Arc::new(BroadcastTickFeed::new(settings.feed_capacity));

    let engine = StrategyEngine::new(
        strategies,
        signals,
        candles,
        feed,
        settings.engine_config(),
        settings.analyzer_config(),
    );

    if engine.seed(user).await? {
        tracing::info!("✓ Default strategy created for user {}", user);
    } else {
        tracing::info!("Default strategy already exists, nothing to do");
    }

    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_strategy_stores(
    settings: &Settings,
) -> Result<(Arc<dyn StrategyStore>, Arc<dyn SignalStore>)> {
    match &settings.database_url {
        Some(url) => {
            let store = Arc::new(PostgresStore::connect(url).await?);
            tracing::info!("Postgres persistence enabled (strategies & signals)");
            Ok((store.clone(), store))
        }
        None => {
            tracing::warn!("No database configured, strategies and signals kept in memory");
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store))
        }
    }
}

async fn connect_candle_source(settings: &Settings) -> Result<Arc<dyn CandleSource>> {
    if let Some(url) = &settings.candle_api_url {
        tracing::info!("Using candle API at {}", url);
        return Ok(Arc::new(HttpCandleClient::new(url.as_str())?));
    }

    if let Some(url) = &settings.redis_url {
        return Ok(Arc::new(RedisCandleStore::connect(url).await?));
    }

    tracing::warn!("No candle source configured, analysis will find no data");
    Ok(Arc::new(MemoryStore::new()))
}
