//! The ingestion store contract.
//!
//! Implementations live in `migtrack-storage`: `InMemoryStorage`,
//! `SqliteStorage` and `PostgresStorage`.

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cursor::{CursorUpdate, SyncCursor};
use crate::error::IndexerError;
use crate::stats::{daily_stats, AggregateSnapshot, DailyStat};
use crate::types::MigrationEvent;

/// Aggregates as they stood on one UTC date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub total_events: u64,
    pub total_amount: U256,
    pub unique_addresses: u64,
    pub average_amount: U256,
    pub median_amount: U256,
}

impl DailySnapshot {
    pub fn from_aggregate(date: NaiveDate, snapshot: &AggregateSnapshot) -> Self {
        Self {
            date,
            total_events: snapshot.total_events,
            total_amount: snapshot.total_amount,
            unique_addresses: snapshot.unique_addresses,
            average_amount: snapshot.average_amount,
            median_amount: snapshot.median_amount,
        }
    }
}

/// Durable, idempotent storage for migration events and the sync cursor.
///
/// Every method is safe to call from concurrent sync passes: inserts are
/// deduplicated by `tx_hash` and the cursor update is a compare-and-swap.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Insert every event whose `tx_hash` is not yet stored.
    ///
    /// Returns the number of rows actually inserted. Existing keys are
    /// skipped silently (first write wins); a batch is all-or-nothing.
    async fn upsert_batch(&self, events: &[MigrationEvent]) -> Result<u64, IndexerError>;

    /// Current cursor. A fresh store reports block 0.
    async fn cursor(&self) -> Result<SyncCursor, IndexerError>;

    /// Move the cursor to `block` unless that would move it backwards.
    async fn advance_cursor(&self, block: u64) -> Result<CursorUpdate, IndexerError>;

    async fn event_count(&self) -> Result<u64, IndexerError>;

    /// Every event, ordered by `(block_number, log_index)`.
    async fn all_events(&self) -> Result<Vec<MigrationEvent>, IndexerError>;

    /// Events sent by `address` (case-insensitive), oldest first.
    async fn events_by_address(&self, address: &str) -> Result<Vec<MigrationEvent>, IndexerError>;

    /// Events with `amount_raw >= threshold`, largest first.
    async fn events_above(&self, threshold: U256) -> Result<Vec<MigrationEvent>, IndexerError>;

    /// The `limit` most recent events, newest first.
    async fn timeline(&self, limit: usize) -> Result<Vec<MigrationEvent>, IndexerError>;

    /// Upsert the snapshot for its date (last write of the day wins).
    async fn record_daily_snapshot(&self, snapshot: DailySnapshot) -> Result<(), IndexerError>;

    /// Recorded snapshots, oldest date first.
    async fn daily_snapshots(&self) -> Result<Vec<DailySnapshot>, IndexerError>;

    /// Delete all events and snapshots and reset the cursor to 0.
    async fn reset(&self) -> Result<(), IndexerError>;

    async fn aggregate(&self, top_n: usize) -> Result<AggregateSnapshot, IndexerError> {
        let events = self.all_events().await?;
        Ok(AggregateSnapshot::from_events(&events, top_n))
    }

    async fn daily_stats(&self) -> Result<Vec<DailyStat>, IndexerError> {
        let events = self.all_events().await?;
        Ok(daily_stats(&events))
    }
}
