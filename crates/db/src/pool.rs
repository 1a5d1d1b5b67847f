//! Pool setup and schema migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

pub type DbPool = PgPool;

/// A run waiting longer than this for a connection fails with a
/// retryable store error instead of hanging its worker task.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `database_url`, holding at most `max_connections` open.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!(max_connections, "connecting to database");
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?)
}

/// Bring the workflow and execution tables up to date.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("applying database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
