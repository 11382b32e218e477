//! The account/character persistence layer (§6, §10): a `sqlx` Postgres pool
//! plus a small set of named query functions, no repository trait — there's
//! one backing store and abstracting over it would buy nothing.

pub mod models;
pub mod queries;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// DB reads are capped at 1s, writes at 3s (§5's timeout discipline) — a
/// stalled connection must not wedge a connection task indefinitely.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Connects to Postgres and runs pending migrations.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Runs a read-only query future under the read timeout, mapping elapsed to
/// [`DbError::Timeout`].
pub async fn with_read_timeout<T>(fut: impl std::future::Future<Output = Result<T, DbError>>) -> Result<T, DbError> {
    tokio::time::timeout(READ_TIMEOUT, fut).await.unwrap_or(Err(DbError::Timeout))
}

/// Runs a mutating query future (or transaction) under the write timeout,
/// mapping elapsed to [`DbError::Timeout`].
pub async fn with_write_timeout<T>(fut: impl std::future::Future<Output = Result<T, DbError>>) -> Result<T, DbError> {
    tokio::time::timeout(WRITE_TIMEOUT, fut).await.unwrap_or(Err(DbError::Timeout))
}
