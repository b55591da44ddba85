//! Fluent builder for sync engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use migtrack_core::store::MigrationStore;
//! use migtrack_evm::{SyncBuilder, SyncEngine};
//! use migtrack_rpc::LogGateway;
//!
//! fn engine(gateway: Arc<dyn LogGateway>, store: Arc<dyn MigrationStore>) -> SyncEngine {
//!     SyncBuilder::new()
//!         .start_block(25_000_000)
//!         .batch_size(5_000)
//!         .concurrency(4)
//!         .confirmation_depth(2)
//!         .build(gateway, store)
//! }
//! ```

use std::sync::Arc;

use migtrack_core::indexer::{SyncConfig, TokenConfig};
use migtrack_core::store::MigrationStore;
use migtrack_rpc::LogGateway;

use crate::sync::SyncEngine;

/// Fluent builder for [`SyncConfig`] and [`TokenConfig`].
#[derive(Debug, Clone, Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    token: TokenConfig,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token contract to scan.
    pub fn token(mut self, address: impl Into<String>) -> Self {
        self.token.token_address = address.into();
        self
    }

    /// Contract that receives migrated tokens.
    pub fn migration_contract(mut self, address: impl Into<String>) -> Self {
        self.token.migration_contract = address.into();
        self
    }

    pub fn decimals(mut self, decimals: u8) -> Self {
        self.token.decimals = decimals;
        self
    }

    /// First block of a fresh incremental sync.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    /// Blocks per `eth_getLogs` call.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    /// Fetch receipts to tag origin chains.
    pub fn classify_sources(mut self, enabled: bool) -> Self {
        self.config.classify_sources = enabled;
        self
    }

    pub fn bridge_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.bridge_signatures = signatures.into_iter().map(Into::into).collect();
        self
    }

    pub fn record_snapshots(mut self, enabled: bool) -> Self {
        self.config.record_snapshots = enabled;
        self
    }

    pub fn build_config(self) -> (TokenConfig, SyncConfig) {
        (self.token, self.config)
    }

    pub fn build(self, gateway: Arc<dyn LogGateway>, store: Arc<dyn MigrationStore>) -> SyncEngine {
        SyncEngine::new(gateway, store, self.token, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migtrack_core::indexer::DEFAULT_MIGRATION_CONTRACT;

    #[test]
    fn builder_defaults() {
        let (token, cfg) = SyncBuilder::new().build_config();
        assert_eq!(token.decimals, 18);
        assert_eq!(token.migration_contract, DEFAULT_MIGRATION_CONTRACT);
        assert_eq!(cfg.batch_size, 10_000);
        assert_eq!(cfg.concurrency, 1);
        assert!(cfg.classify_sources);
    }

    #[test]
    fn builder_custom() {
        let (token, cfg) = SyncBuilder::new()
            .token("0xabc")
            .decimals(6)
            .start_block(25_000_000)
            .batch_size(500)
            .concurrency(8)
            .confirmation_depth(3)
            .classify_sources(false)
            .bridge_signatures(["0x01"])
            .record_snapshots(false)
            .build_config();

        assert_eq!(token.token_address, "0xabc");
        assert_eq!(token.decimals, 6);
        assert_eq!(cfg.start_block, 25_000_000);
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.confirmation_depth, 3);
        assert!(!cfg.classify_sources);
        assert_eq!(cfg.bridge_signatures, vec!["0x01".to_string()]);
        assert!(!cfg.record_snapshots);
    }
}
