//! migtrack-core: domain model and contracts for the migration indexer.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine (migtrack-evm)
//!     ├── RangeBatcher     (bounded sub-ranges)
//!     ├── EventDecoder     (raw log → MigrationEvent)
//!     ├── LogGateway       (migtrack-rpc, retry + rate limit)
//!     └── MigrationStore   (memory / SQLite / Postgres)
//!             └── AggregateSnapshot, daily series (this crate)
//! ```

pub mod cursor;
pub mod error;
pub mod indexer;
pub mod range;
pub mod stats;
pub mod store;
pub mod types;
pub mod units;

pub use cursor::{CursorUpdate, SyncCursor};
pub use error::{DecodeError, IndexerError};
pub use indexer::{SyncConfig, SyncState, TokenConfig};
pub use range::{split_range, BlockRange};
pub use stats::{AggregateSnapshot, DailyStat, SourceShare};
pub use store::{DailySnapshot, MigrationStore};
pub use types::{MigrationEvent, SourceChain};
