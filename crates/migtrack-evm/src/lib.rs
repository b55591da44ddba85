//! migtrack-evm: decoding, deployment lookup and the sync orchestrator.

pub mod abi;
pub mod builder;
pub mod classifier;
pub mod deadline;
pub mod decoder;
pub mod locator;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod sync;

pub use builder::SyncBuilder;
pub use classifier::{ReceiptClassifier, SourceClassifier, StaticClassifier};
pub use deadline::{Deadline, DeadlineProbe};
pub use decoder::{migration_filter, DecodeFailure, DecodeOutcome, EventDecoder, EventLayout, FieldLoc};
pub use locator::DeploymentLocator;
pub use sync::{SyncEngine, SyncMode, SyncOptions, SyncReport};
