use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groovebox_server::events::TaskEventBus;
use groovebox_server::repositories::PgTaskStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groovebox_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = groovebox_shared_config::CommonConfig::from_env()?;

    tracing::info!(environment = %config.environment, "Starting Groovebox server");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    let _store = PgTaskStore::new(pool);
    let _events = TaskEventBus::try_with_redis(&config.redis.connection_url()).await;

    // TODO: wire the media pipeline's download/import executors here, build
    // the TaskProcessor from the store and event bus, and run `recover()`
    // before the HTTP layer starts accepting submissions.

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
