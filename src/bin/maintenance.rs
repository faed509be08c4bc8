use std::{env, sync::Arc};

use anyhow::{Context, Result};

use docpilot::{
    config::AppConfig,
    repository::{PgRepository, Repository},
};

const USAGE: &str = "Usage: maintenance <retry-failed [ceiling] | clear-completed [days] | stats>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).compact().init();

    let mut args = env::args().skip(1);
    let command = args.next();
    let argument = args.next();
    match command.as_deref() {
        Some("retry-failed") => {
            let ceiling = parse_arg(argument.as_deref(), 3).context("ceiling must be a number")?;
            let requeued = connect().await?.retry_failed(ceiling, None).await?;
            println!("Re-queued {requeued} failed items (ceiling {ceiling}).");
        }
        Some("clear-completed") => {
            let days: i64 = parse_arg(argument.as_deref(), 7).context("days must be a number")?;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days.max(0));
            let cleared = connect()
                .await?
                .clear_completed_older_than(cutoff, None)
                .await?;
            println!("Cleared {cleared} completed items older than {days} days.");
        }
        Some("stats") => {
            let counts = connect().await?.queue_counts(None).await?;
            println!(
                "queued={} processing={} completed={} failed={} total={}",
                counts.queued, counts.processing, counts.completed, counts.failed, counts.total
            );
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn connect() -> Result<Arc<dyn Repository>> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded configuration"
    );
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for maintenance commands")?;
    let repo = PgRepository::connect(url, config.database_max_pool_size).await?;
    Ok(Arc::new(repo))
}

fn parse_arg<T: std::str::FromStr>(raw: Option<&str>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => Ok(value.parse()?),
        None => Ok(default),
    }
}
