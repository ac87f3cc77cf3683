//! Database layer
//!
//! Persistence for the local platform the client talks to. Rows live in
//! SQLite; the schema is bootstrapped by embedded migrations and each
//! collection is accessed through its own repository.
//!
//! # Usage
//!
//! ```ignore
//! use spiral::config::DatabaseConfig;
//! use spiral::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Read a TEXT column holding a UUID
pub(crate) fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).with_context(|| format!("Invalid UUID in column '{}': {}", column, raw))
}
