//! migtrack-storage: storage backends for migration events.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - [`postgres`]: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! SQL backends store amounts as 78-digit zero-padded decimal text, so the
//! full `uint256` range survives and lexical order equals numeric order.

use std::sync::Arc;

use alloy_primitives::U256;

use migtrack_core::error::IndexerError;
use migtrack_core::store::MigrationStore;

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;

/// Decimal digits of `2^256 - 1`.
pub const AMOUNT_WIDTH: usize = 78;

/// Encode an amount as fixed-width decimal text.
pub fn encode_amount(amount: U256) -> String {
    format!("{:0>width$}", amount.to_string(), width = AMOUNT_WIDTH)
}

/// Inverse of [`encode_amount`]; also accepts unpadded decimals.
pub fn decode_amount(text: &str) -> Result<U256, IndexerError> {
    U256::from_str_radix(text.trim(), 10)
        .map_err(|e| IndexerError::Storage(format!("corrupt amount '{text}': {e}")))
}

/// Convert a block number or count to a SQL `BIGINT`.
pub fn sql_int(value: u64, column: &str) -> Result<i64, IndexerError> {
    i64::try_from(value)
        .map_err(|_| IndexerError::Storage(format!("{column} {value} does not fit in a BIGINT")))
}

/// Open the backend named by `url`.
///
/// - `memory`: [`InMemoryStorage`]
/// - `sqlite:…` or a plain file path: [`SqliteStorage`]
/// - `postgres://…` / `postgresql://…`: [`PostgresStorage`]
pub async fn connect(url: &str) -> Result<Arc<dyn MigrationStore>, IndexerError> {
    if url == "memory" || url == "memory:" {
        return Ok(Arc::new(InMemoryStorage::new()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return connect_postgres(url).await;
    }
    connect_sqlite(url).await
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str) -> Result<Arc<dyn MigrationStore>, IndexerError> {
    Ok(Arc::new(PostgresStorage::connect(url).await?))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_url: &str) -> Result<Arc<dyn MigrationStore>, IndexerError> {
    Err(IndexerError::Config(
        "postgres support is not compiled in (enable the `postgres` feature)".into(),
    ))
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(url: &str) -> Result<Arc<dyn MigrationStore>, IndexerError> {
    Ok(Arc::new(SqliteStorage::open(url).await?))
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(url: &str) -> Result<Arc<dyn MigrationStore>, IndexerError> {
    Err(IndexerError::Config(format!("unsupported storage url '{url}'")))
}
