use crate::config::DatabaseConfig;
use crate::error::StoreError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Connect with exponential backoff so the service can start before Postgres is ready.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let retry_strategy = ExponentialBackoff::from_millis(config.connect_retry_delay_ms.max(1))
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(config.connect_retries);

    Retry::start(retry_strategy, || async move {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Postgres connect attempt failed");
                e
            })
    })
    .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
