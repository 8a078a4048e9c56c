//! Database access layer
//!
//! Row-level query modules over the sqlx pool. Higher-level policy (dedup,
//! validation, transactions spanning catalogs) lives in the services layer.

pub mod catalog;
pub mod recipes;
pub mod schedules;
pub mod schema;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open the connection pool and bootstrap the schema.
pub async fn init_pool(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    schema::initialize_schema(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests. A fresh pooled connection would see its own
/// empty in-memory database, so the pool is pinned to a single connection.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    schema::initialize_schema(&pool).await?;
    Ok(pool)
}
