use markets_analysis::config::Config;
use markets_analysis::services::{CycleRunner, HistorySeeder, SqliteStore};
use markets_analysis::sources::ProviderChain;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "markets_analysis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!("Starting markets analysis (db: {})", config.db_path);

    let store = Arc::new(SqliteStore::new(&config.db_path)?);
    store.ensure_watchlist(&config.default_user_id)?;

    let provider = Arc::new(ProviderChain::from_config(&config)?);
    let seeder = HistorySeeder::with_limits(
        store.clone(),
        provider,
        config.min_history_bars,
        config.seed_days,
    );
    let runner = Arc::new(
        CycleRunner::new(store, seeder, config.default_user_id.clone())
            .with_lookback(config.history_lookback)
            .with_interval(Duration::from_secs(config.cycle_interval_secs)),
    );

    // Initial pass before the scheduler takes over
    if let Err(e) = runner.run_cycle().await {
        error!("Initial cycle failed: {}", e);
    }

    let scheduler = runner.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    scheduler.abort();

    Ok(())
}
