//! Application configuration.
//!
//! Loaded from an optional JSON file; missing fields take their defaults.
//! Command-line flags (and their `MIGTRACK_*` environment variables) are
//! applied on top in `main`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use migtrack_core::indexer::{SyncConfig, TokenConfig};
use migtrack_rpc::{GatewayConfig, RateLimiterConfig, RetryConfig};

use crate::logging::LogConfig;

pub const DEFAULT_RPC_URL: &str = "https://rpc.soniclabs.com";
pub const DEFAULT_STORAGE_URL: &str = "migrations.db";

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_storage_url() -> String {
    DEFAULT_STORAGE_URL.into()
}

/// JSON-RPC endpoint and the gateway policies applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            retry: self.retry.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }
}

/// Where events are stored: `memory`, a SQLite path / `sqlite:` URL, or a
/// `postgres://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_url")]
    pub url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Read `path` if given, else start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            bail!("rpc.url must not be empty");
        }
        if self.sync.batch_size == 0 {
            bail!("sync.batch_size must be at least 1");
        }
        if self.rpc.retry.max_attempts == 0 {
            bail!("rpc.retry.max_attempts must be at least 1");
        }
        let limit = &self.rpc.rate_limit;
        if limit.capacity.is_nan() || limit.capacity <= 0.0 {
            bail!("rpc.rate_limit.capacity must be positive, got {}", limit.capacity);
        }
        if limit.refill_rate.is_nan() || limit.refill_rate <= 0.0 {
            bail!("rpc.rate_limit.refill_rate must be positive, got {}", limit.refill_rate);
        }
        if !(0.0..=limit.capacity).contains(&limit.logs_cost) {
            bail!(
                "rpc.rate_limit.logs_cost ({}) must be between 0 and capacity ({})",
                limit.logs_cost,
                limit.capacity
            );
        }
        for (name, address) in [
            ("token.token_address", &self.token.token_address),
            ("token.migration_contract", &self.token.migration_contract),
        ] {
            if !is_address(address) {
                bail!("{name} is not a 20-byte hex address: {address}");
            }
        }
        Ok(())
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map_or(false, |hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
