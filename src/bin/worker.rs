use tokio::signal;
use tracing_subscriber::EnvFilter;

use docpilot::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        mode = config.processing.mode.as_str(),
        workers = config.processing.concurrent_workers,
        polling_interval_secs = config.processing.polling_interval.as_secs(),
        batch_schedule = %config.processing.batch.schedule,
        "loaded configuration"
    );
    let state = AppState::from_config(config).await?;
    let manager = state.manager.clone();

    manager.start().await;
    signal::ctrl_c().await?;
    tracing::info!("worker received shutdown signal");
    manager.stop().await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
