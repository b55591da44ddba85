//! In-memory storage backend.
//!
//! Holds events, the cursor and daily snapshots in RAM behind one lock, so a
//! batch insert is atomic. Useful for tests and dry runs; all data is lost
//! when the process exits.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::debug;

use migtrack_core::cursor::{CursorUpdate, SyncCursor};
use migtrack_core::error::IndexerError;
use migtrack_core::store::{DailySnapshot, MigrationStore};
use migtrack_core::types::MigrationEvent;

#[derive(Default)]
struct State {
    events: Vec<MigrationEvent>,
    keys: HashSet<String>,
    cursor: SyncCursor,
    snapshots: BTreeMap<NaiveDate, DailySnapshot>,
}

/// In-memory migration store.
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn by_position(a: &MigrationEvent, b: &MigrationEvent) -> std::cmp::Ordering {
    a.position().cmp(&b.position())
}

#[async_trait]
impl MigrationStore for InMemoryStorage {
    async fn upsert_batch(&self, events: &[MigrationEvent]) -> Result<u64, IndexerError> {
        let mut state = self.state();
        let mut inserted = 0u64;
        for event in events {
            if state.keys.insert(event.tx_hash.clone()) {
                state.events.push(event.clone());
                inserted += 1;
            }
        }
        debug!(batch = events.len(), inserted, "events stored");
        Ok(inserted)
    }

    async fn cursor(&self) -> Result<SyncCursor, IndexerError> {
        Ok(self.state().cursor.clone())
    }

    async fn advance_cursor(&self, block: u64) -> Result<CursorUpdate, IndexerError> {
        Ok(self.state().cursor.try_advance(block, Utc::now()))
    }

    async fn event_count(&self) -> Result<u64, IndexerError> {
        Ok(self.state().events.len() as u64)
    }

    async fn all_events(&self) -> Result<Vec<MigrationEvent>, IndexerError> {
        let mut events = self.state().events.clone();
        events.sort_by(by_position);
        Ok(events)
    }

    async fn events_by_address(&self, address: &str) -> Result<Vec<MigrationEvent>, IndexerError> {
        let address = address.to_lowercase();
        let mut events: Vec<_> = self
            .state()
            .events
            .iter()
            .filter(|e| e.from_address.to_lowercase() == address)
            .cloned()
            .collect();
        events.sort_by(by_position);
        Ok(events)
    }

    async fn events_above(&self, threshold: U256) -> Result<Vec<MigrationEvent>, IndexerError> {
        let mut events: Vec<_> = self
            .state()
            .events
            .iter()
            .filter(|e| e.amount_raw >= threshold)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.amount_raw.cmp(&a.amount_raw).then_with(|| by_position(a, b)));
        Ok(events)
    }

    async fn timeline(&self, limit: usize) -> Result<Vec<MigrationEvent>, IndexerError> {
        let mut events = self.state().events.clone();
        events.sort_by(|a, b| by_position(b, a));
        events.truncate(limit);
        Ok(events)
    }

    async fn record_daily_snapshot(&self, snapshot: DailySnapshot) -> Result<(), IndexerError> {
        self.state().snapshots.insert(snapshot.date, snapshot);
        Ok(())
    }

    async fn daily_snapshots(&self) -> Result<Vec<DailySnapshot>, IndexerError> {
        Ok(self.state().snapshots.values().cloned().collect())
    }

    async fn reset(&self) -> Result<(), IndexerError> {
        *self.state() = State::default();
        Ok(())
    }
}
