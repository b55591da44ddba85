//! Shared domain types for the migration indexer.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::units::format_units;

// ─── SourceChain ─────────────────────────────────────────────────────────────

/// Best-effort classification of where a migration originated.
///
/// This is a heuristic tag, not an authoritative answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChain {
    /// Native to the chain the contract lives on.
    Sonic,
    /// Bridged in from Ethereum.
    Ethereum,
    /// Classification was skipped or failed.
    #[default]
    Unknown,
}

impl SourceChain {
    pub const ALL: [SourceChain; 3] = [Self::Sonic, Self::Ethereum, Self::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sonic => "sonic",
            Self::Ethereum => "ethereum",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceChain {
    type Err = std::convert::Infallible;

    /// Unrecognised tags map to `Unknown` so rows written by newer versions
    /// still load.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "sonic" => Self::Sonic,
            "ethereum" => Self::Ethereum,
            _ => Self::Unknown,
        })
    }
}

// ─── MigrationEvent ──────────────────────────────────────────────────────────

/// One on-chain transfer-like event attributable to the migration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationEvent {
    /// Transaction hash (`0x…`, lower-case). The deduplication key.
    pub tx_hash: String,
    /// Position of the log within its transaction receipt.
    pub log_index: u32,
    /// Sender (`0x` + 40 lower-case hex chars).
    pub from_address: String,
    /// Recipient (`0x` + 40 lower-case hex chars).
    pub to_address: String,
    /// Amount in the token's smallest unit.
    pub amount_raw: U256,
    /// Token decimals used to derive the display amount.
    pub decimals: u8,
    /// Block the event was included in.
    pub block_number: u64,
    /// Block timestamp (UNIX seconds); `None` if the header lookup failed.
    pub block_timestamp: Option<i64>,
    /// Heuristic origin tag.
    pub source_chain: SourceChain,
}

impl MigrationEvent {
    /// Amount in display units (`amount_raw / 10^decimals`), exact.
    pub fn amount_display(&self) -> String {
        format_units(self.amount_raw, self.decimals)
    }

    /// `(block_number, log_index)`: the event's position in the chain's total order.
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
