//! SQLite storage backend.
//!
//! Persists migration events, the sync cursor and daily snapshots to a single
//! SQLite file. Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use migtrack_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./migrations.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use migtrack_core::cursor::{CursorUpdate, SyncCursor};
use migtrack_core::error::IndexerError;
use migtrack_core::store::{DailySnapshot, MigrationStore};
use migtrack_core::types::MigrationEvent;

use crate::{decode_amount, encode_amount, sql_int};

const EVENT_COLUMNS: &str = "tx_hash, log_index, from_address, to_address, amount_raw, decimals, \
                             block_number, block_timestamp, source_chain";

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed migration store.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./migrations.db"`) or a full
    /// SQLite URL (`"sqlite:./migrations.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        // WAL mode: better concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool is
    /// pinned to one connection that is never recycled. All data is lost when
    /// the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS migrations (
                tx_hash         TEXT    PRIMARY KEY,
                log_index       INTEGER NOT NULL,
                from_address    TEXT    NOT NULL,
                to_address      TEXT    NOT NULL,
                amount_raw      TEXT    NOT NULL,
                decimals        INTEGER NOT NULL,
                block_number    INTEGER NOT NULL,
                block_timestamp INTEGER,
                source_chain    TEXT    NOT NULL
            );",
            "CREATE INDEX IF NOT EXISTS idx_migrations_from ON migrations (from_address);",
            "CREATE INDEX IF NOT EXISTS idx_migrations_block ON migrations (block_number, log_index);",
            "CREATE INDEX IF NOT EXISTS idx_migrations_amount ON migrations (amount_raw);",
            "CREATE TABLE IF NOT EXISTS sync_cursor (
                id                INTEGER PRIMARY KEY CHECK (id = 1),
                last_synced_block INTEGER NOT NULL,
                last_sync_time    INTEGER
            );",
            "INSERT OR IGNORE INTO sync_cursor (id, last_synced_block, last_sync_time) VALUES (1, 0, NULL);",
            "CREATE TABLE IF NOT EXISTS daily_snapshots (
                date             TEXT    PRIMARY KEY,
                total_events     INTEGER NOT NULL,
                total_amount     TEXT    NOT NULL,
                unique_addresses INTEGER NOT NULL,
                average_amount   TEXT    NOT NULL,
                median_amount    TEXT    NOT NULL
            );",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(storage_err)?;
        }
        Ok(())
    }

    async fn fetch_events(&self, sql: &str, bind: Option<String>) -> Result<Vec<MigrationEvent>, IndexerError> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.iter().map(row_to_event).collect()
    }
}

fn row_to_event(row: &SqliteRow) -> Result<MigrationEvent, IndexerError> {
    let source: String = row.get("source_chain");
    Ok(MigrationEvent {
        tx_hash: row.get("tx_hash"),
        log_index: row.get::<i64, _>("log_index") as u32,
        from_address: row.get("from_address"),
        to_address: row.get("to_address"),
        amount_raw: decode_amount(row.get::<&str, _>("amount_raw"))?,
        decimals: row.get::<i64, _>("decimals") as u8,
        block_number: row.get::<i64, _>("block_number") as u64,
        block_timestamp: row.get("block_timestamp"),
        source_chain: source.parse().unwrap_or_default(),
    })
}

fn row_to_snapshot(row: &SqliteRow) -> Result<DailySnapshot, IndexerError> {
    let date: String = row.get("date");
    Ok(DailySnapshot {
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| IndexerError::Storage(format!("corrupt snapshot date '{date}': {e}")))?,
        total_events: row.get::<i64, _>("total_events") as u64,
        total_amount: decode_amount(row.get::<&str, _>("total_amount"))?,
        unique_addresses: row.get::<i64, _>("unique_addresses") as u64,
        average_amount: decode_amount(row.get::<&str, _>("average_amount"))?,
        median_amount: decode_amount(row.get::<&str, _>("median_amount"))?,
    })
}

#[async_trait]
impl MigrationStore for SqliteStorage {
    async fn upsert_batch(&self, events: &[MigrationEvent]) -> Result<u64, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let mut inserted = 0u64;
        for event in events {
            let result = sqlx::query(
                "INSERT INTO migrations (tx_hash, log_index, from_address, to_address, amount_raw,
                                         decimals, block_number, block_timestamp, source_chain)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(tx_hash) DO NOTHING",
            )
            .bind(&event.tx_hash)
            .bind(event.log_index as i64)
            .bind(event.from_address.to_lowercase())
            .bind(event.to_address.to_lowercase())
            .bind(encode_amount(event.amount_raw))
            .bind(event.decimals as i64)
            .bind(sql_int(event.block_number, "block_number")?)
            .bind(event.block_timestamp)
            .bind(event.source_chain.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(storage_err)?;

        debug!(batch = events.len(), inserted, "events stored");
        Ok(inserted)
    }

    async fn cursor(&self) -> Result<SyncCursor, IndexerError> {
        let row = sqlx::query("SELECT last_synced_block, last_sync_time FROM sync_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row
            .map(|r| SyncCursor {
                last_synced_block: r.get::<i64, _>("last_synced_block") as u64,
                last_sync_time: r
                    .get::<Option<i64>, _>("last_sync_time")
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            })
            .unwrap_or_default())
    }

    async fn advance_cursor(&self, block: u64) -> Result<CursorUpdate, IndexerError> {
        let bound = sql_int(block, "last_synced_block")?;
        let current = self.cursor().await?.last_synced_block;
        if block < current {
            return Ok(CursorUpdate::Rejected { current });
        }

        // The WHERE clause keeps the update safe against a concurrent pass
        // that moved the cursor after the read above.
        let result = sqlx::query(
            "UPDATE sync_cursor SET last_synced_block = ?, last_sync_time = ?
             WHERE id = 1 AND last_synced_block <= ?",
        )
        .bind(bound)
        .bind(Utc::now().timestamp())
        .bind(bound)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            let current = self.cursor().await?.last_synced_block;
            return Ok(CursorUpdate::Rejected { current });
        }
        debug!(from = current, to = block, "cursor advanced");
        Ok(CursorUpdate::Advanced { from: current, to: block })
    }

    async fn event_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn all_events(&self) -> Result<Vec<MigrationEvent>, IndexerError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM migrations ORDER BY block_number, log_index");
        self.fetch_events(&sql, None).await
    }

    async fn events_by_address(&self, address: &str) -> Result<Vec<MigrationEvent>, IndexerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM migrations WHERE from_address = ?
             ORDER BY block_number, log_index"
        );
        self.fetch_events(&sql, Some(address.to_lowercase())).await
    }

    async fn events_above(&self, threshold: U256) -> Result<Vec<MigrationEvent>, IndexerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM migrations WHERE amount_raw >= ?
             ORDER BY amount_raw DESC, block_number, log_index"
        );
        self.fetch_events(&sql, Some(encode_amount(threshold))).await
    }

    async fn timeline(&self, limit: usize) -> Result<Vec<MigrationEvent>, IndexerError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM migrations
             ORDER BY block_number DESC, log_index DESC LIMIT {}",
            limit.min(i64::MAX as usize)
        );
        self.fetch_events(&sql, None).await
    }

    async fn record_daily_snapshot(&self, snapshot: DailySnapshot) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO daily_snapshots (date, total_events, total_amount, unique_addresses,
                                          average_amount, median_amount)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(date) DO UPDATE SET
                total_events     = excluded.total_events,
                total_amount     = excluded.total_amount,
                unique_addresses = excluded.unique_addresses,
                average_amount   = excluded.average_amount,
                median_amount    = excluded.median_amount",
        )
        .bind(snapshot.date.format("%Y-%m-%d").to_string())
        .bind(sql_int(snapshot.total_events, "total_events")?)
        .bind(encode_amount(snapshot.total_amount))
        .bind(sql_int(snapshot.unique_addresses, "unique_addresses")?)
        .bind(encode_amount(snapshot.average_amount))
        .bind(encode_amount(snapshot.median_amount))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(date = %snapshot.date, "daily snapshot recorded");
        Ok(())
    }

    async fn daily_snapshots(&self) -> Result<Vec<DailySnapshot>, IndexerError> {
        let rows = sqlx::query(
            "SELECT date, total_events, total_amount, unique_addresses, average_amount, median_amount
             FROM daily_snapshots ORDER BY date",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(row_to_snapshot).collect()
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for sql in [
            "DELETE FROM migrations",
            "DELETE FROM daily_snapshots",
            "UPDATE sync_cursor SET last_synced_block = 0, last_sync_time = NULL WHERE id = 1",
        ] {
            sqlx::query(sql).execute(&mut *tx).await.map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use migtrack_core::types::SourceChain;

    fn event(n: u64, from: &str, amount: U256) -> MigrationEvent {
        MigrationEvent {
            tx_hash: format!("0x{n:064x}"),
            log_index: n as u32 % 3,
            from_address: from.to_string(),
            to_address: "0x99fe40e501151e92f10ac13ea1c06083ee170363".into(),
            amount_raw: amount,
            decimals: 18,
            block_number: n,
            block_timestamp: if n % 2 == 0 { Some(1_704_067_200) } else { None },
            source_chain: SourceChain::Ethereum,
        }
    }

    fn small(n: u64, amount: u64) -> MigrationEvent {
        event(n, "0x1111111111111111111111111111111111111111", U256::from(amount))
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let batch: Vec<_> = (1..=4).map(|n| small(n, n * 100)).collect();
        assert_eq!(store.upsert_batch(&batch).await.unwrap(), 4);
        assert_eq!(store.upsert_batch(&batch).await.unwrap(), 0);
        assert_eq!(store.event_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn events_round_trip_losslessly() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let huge = event(2, "0xABCDEF0000000000000000000000000000000001", U256::MAX);
        let plain = small(1, 7);
        store.upsert_batch(&[huge.clone(), plain.clone()]).await.unwrap();

        let all = store.all_events().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], plain);
        assert_eq!(all[1].amount_raw, U256::MAX);
        assert_eq!(all[1].block_timestamp, Some(1_704_067_200));
        assert_eq!(all[1].from_address, huge.from_address.to_lowercase());
        assert_eq!(all[1].source_chain, SourceChain::Ethereum);
    }

    #[tokio::test]
    async fn cursor_is_monotonic() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.cursor().await.unwrap().is_initial());

        let update = store.advance_cursor(500).await.unwrap();
        assert_eq!(update, CursorUpdate::Advanced { from: 0, to: 500 });
        assert_eq!(
            store.advance_cursor(499).await.unwrap(),
            CursorUpdate::Rejected { current: 500 }
        );

        let cursor = store.cursor().await.unwrap();
        assert_eq!(cursor.last_synced_block, 500);
        assert!(cursor.last_sync_time.is_some());
        assert!(!store.advance_cursor(500).await.unwrap().is_rejected());
    }

    #[tokio::test]
    async fn threshold_uses_numeric_order() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store
            .upsert_batch(&[small(1, 9), small(2, 100), small(3, 1_000), small(4, 99)])
            .await
            .unwrap();
        let above = store.events_above(U256::from(99u64)).await.unwrap();
        let amounts: Vec<u64> = above.iter().map(|e| e.amount_raw.to::<u64>()).collect();
        assert_eq!(amounts, vec![1_000, 100, 99]);
    }

    #[tokio::test]
    async fn address_and_timeline_queries() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let other = event(5, "0x2222222222222222222222222222222222222222", U256::from(1u64));
        store
            .upsert_batch(&[small(1, 1), small(3, 3), other])
            .await
            .unwrap();

        let mine = store
            .events_by_address("0x1111111111111111111111111111111111111111")
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].block_number < mine[1].block_number);

        let recent = store.timeline(2).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.block_number).collect::<Vec<_>>(), vec![5, 3]);
    }

    #[tokio::test]
    async fn daily_snapshots_and_reset() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut snap = DailySnapshot {
            date,
            total_events: 3,
            total_amount: U256::from(60u64),
            unique_addresses: 2,
            average_amount: U256::from(20u64),
            median_amount: U256::from(20u64),
        };
        store.record_daily_snapshot(snap.clone()).await.unwrap();
        snap.total_events = 4;
        store.record_daily_snapshot(snap.clone()).await.unwrap();
        assert_eq!(store.daily_snapshots().await.unwrap(), vec![snap]);

        store.upsert_batch(&[small(1, 1)]).await.unwrap();
        store.advance_cursor(42).await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.event_count().await.unwrap(), 0);
        assert!(store.daily_snapshots().await.unwrap().is_empty());
        assert!(store.cursor().await.unwrap().is_initial());
    }

    #[tokio::test]
    async fn block_numbers_beyond_bigint_are_rejected() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.advance_cursor(7).await.unwrap();
        assert!(matches!(store.advance_cursor(u64::MAX).await, Err(IndexerError::Storage(_))));
        assert_eq!(store.cursor().await.unwrap().last_synced_block, 7);

        let batch = vec![small(1, 1), small(u64::MAX, 1)];
        assert!(store.upsert_batch(&batch).await.is_err());
        assert_eq!(store.event_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_are_idempotent() {
        let path = std::env::temp_dir().join(format!("migtrack-concurrent-{}.db", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let store = Arc::new(SqliteStorage::open(&path_str).await.unwrap());

        // writer w stores blocks 50w+1 ..= 50w+200 and moves the cursor to 1000 - 10w
        let writers: Vec<_> = (0..8u64)
            .map(|w| {
                let store = store.clone();
                tokio::spawn(async move {
                    let batch: Vec<_> = (w * 50 + 1..=w * 50 + 200).map(|n| small(n, n)).collect();
                    let inserted = store.upsert_batch(&batch).await.unwrap();
                    let update = store.advance_cursor(1_000 - 10 * w).await.unwrap();
                    (inserted, update)
                })
            })
            .collect();

        let mut inserted = 0;
        for writer in writers {
            let (n, update) = writer.await.unwrap();
            inserted += n;
            if let CursorUpdate::Advanced { from, to } = update {
                assert!(from <= to);
            }
        }

        assert_eq!(inserted, 550);
        assert_eq!(store.event_count().await.unwrap(), 550);
        assert_eq!(store.cursor().await.unwrap().last_synced_block, 1_000);
        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let path = std::env::temp_dir().join(format!("migtrack-test-{}.db", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        {
            let store = SqliteStorage::open(&path_str).await.unwrap();
            store.upsert_batch(&[small(1, 1)]).await.unwrap();
            store.advance_cursor(10).await.unwrap();
        }
        let reopened = SqliteStorage::open(&path_str).await.unwrap();
        assert_eq!(reopened.event_count().await.unwrap(), 1);
        assert_eq!(reopened.cursor().await.unwrap().last_synced_block, 10);
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
