//! Sync cursor: the highest block whose events are durably stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The indexer's durable position in the chain.
///
/// The cursor only moves forward, and only after the events of the
/// corresponding block range have been persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Highest block whose events are stored (0 = nothing synced yet).
    pub last_synced_block: u64,
    /// When the cursor was last written.
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new(last_synced_block: u64) -> Self {
        Self {
            last_synced_block,
            last_sync_time: None,
        }
    }

    /// Returns `true` if no pass has ever advanced the cursor.
    pub fn is_initial(&self) -> bool {
        self.last_synced_block == 0
    }

    /// First block an incremental pass should scan.
    ///
    /// A fresh cursor resumes from `go_live` so empty pre-deployment history
    /// is not scanned.
    pub fn resume_from(&self, go_live: u64) -> u64 {
        if self.is_initial() {
            go_live
        } else {
            self.last_synced_block.saturating_add(1)
        }
    }

    /// Compute the outcome of a compare-and-swap advance to `block`.
    ///
    /// Store backends use this for in-process state; SQL backends express the
    /// same rule as a conditional `UPDATE`.
    pub fn try_advance(&mut self, block: u64, now: DateTime<Utc>) -> CursorUpdate {
        if block < self.last_synced_block {
            return CursorUpdate::Rejected {
                current: self.last_synced_block,
            };
        }
        let previous = self.last_synced_block;
        self.last_synced_block = block;
        self.last_sync_time = Some(now);
        CursorUpdate::Advanced { from: previous, to: block }
    }
}

/// Outcome of `MigrationStore::advance_cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorUpdate {
    /// The cursor moved (or was refreshed, when `from == to`).
    Advanced { from: u64, to: u64 },
    /// The requested block is behind the stored cursor; nothing changed.
    Rejected { current: u64 },
}

impl CursorUpdate {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
