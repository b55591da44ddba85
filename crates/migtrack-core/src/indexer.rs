//! Sync configuration and state types.

use serde::{Deserialize, Serialize};

/// PAL token on Sonic.
pub const DEFAULT_TOKEN_ADDRESS: &str = "0xe90fe2de4a415ad48b6dcec08ba6ae98231948ac";
/// Contract that receives migrated tokens.
pub const DEFAULT_MIGRATION_CONTRACT: &str = "0x99fe40e501151e92f10ac13ea1c06083ee170363";

/// Event signatures whose presence in a receipt marks a bridged (Ethereum) origin.
///
/// These are heuristics carried over from the deployed tracker, not verified
/// bridge events. Override them in configuration.
pub const DEFAULT_BRIDGE_SIGNATURES: [&str; 2] = [
    "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925",
    "0x2849b43074093a05396b6f2a937dee8565e4a0d1a0033ea7a8a6c568b5da1a30",
];

fn default_token_address() -> String {
    DEFAULT_TOKEN_ADDRESS.into()
}
fn default_migration_contract() -> String {
    DEFAULT_MIGRATION_CONTRACT.into()
}
fn default_decimals() -> u8 {
    18
}
fn default_batch_size() -> u64 {
    10_000
}
fn default_concurrency() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_bridge_signatures() -> Vec<String> {
    DEFAULT_BRIDGE_SIGNATURES.iter().map(|s| s.to_string()).collect()
}

/// The token being migrated and the contract that collects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token contract whose logs are scanned.
    #[serde(default = "default_token_address")]
    pub token_address: String,
    /// Migration contract; transfers *to* it are migrations.
    #[serde(default = "default_migration_contract")]
    pub migration_contract: String,
    /// Token decimals for display amounts.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            token_address: default_token_address(),
            migration_contract: default_migration_contract(),
            decimals: default_decimals(),
        }
    }
}

/// Configuration for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First block to scan when the cursor is fresh.
    #[serde(default)]
    pub start_block: u64,
    /// Maximum blocks per `eth_getLogs` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Sub-ranges fetched and decoded concurrently. Commits stay in block order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Blocks behind the observed head that are left for the next pass.
    #[serde(default)]
    pub confirmation_depth: u64,
    /// Fetch receipts to tag each event's origin chain.
    #[serde(default = "default_true")]
    pub classify_sources: bool,
    #[serde(default = "default_bridge_signatures")]
    pub bridge_signatures: Vec<String>,
    /// Record a daily snapshot after every successful pass.
    #[serde(default = "default_true")]
    pub record_snapshots: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            confirmation_depth: 0,
            classify_sources: true,
            bridge_signatures: default_bridge_signatures(),
            record_snapshots: true,
        }
    }
}

/// Runtime state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No pass running.
    Idle,
    /// Resolving the first block of the pass.
    DeterminingStart,
    /// Fetching and decoding a sub-range.
    ScanningBatch,
    /// Writing a sub-range's events.
    PersistingBatch,
    /// The cursor moved past a persisted sub-range.
    CursorAdvanced,
    /// The pass stopped on a storage error.
    Failed,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::DeterminingStart => write!(f, "determining-start"),
            Self::ScanningBatch => write!(f, "scanning"),
            Self::PersistingBatch => write!(f, "persisting"),
            Self::CursorAdvanced => write!(f, "cursor-advanced"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
