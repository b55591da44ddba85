//! migtrack CLI: sync token-migration events and inspect what was indexed.
//!
//! # Commands
//! ```text
//! migtrack sync      [--full | --genesis] [--from N] [--to N]
//! migtrack watch     [--interval-secs N]
//! migtrack locate    [--address <addr>]
//! migtrack deadline
//! migtrack status
//! migtrack stats     [--top N] [--rate-days N]
//! migtrack lookup    <address>
//! migtrack large     --threshold <amount>
//! migtrack timeline  [--limit N]
//! migtrack daily     [--snapshots]
//! migtrack reset     --yes
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use migtrack_core::store::MigrationStore;
use migtrack_rpc::{HttpRpcClient, LogGateway, RpcGateway};

mod cmd_query;
mod cmd_sync;
mod config;
mod logging;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "migtrack",
    about = "Token-migration event indexer",
    long_about = "
migtrack: scan an EVM chain for token-migration transfers, store them
idempotently and report aggregates.

ENVIRONMENT VARIABLES:
  MIGTRACK_CONFIG         Path to a JSON config file
  MIGTRACK_RPC_URL        JSON-RPC endpoint (default: https://rpc.soniclabs.com)
  MIGTRACK_DATABASE_URL   memory | <sqlite path> | postgres://...
  RUST_LOG                Overrides the configured log filter
",
    version
)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "MIGTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint
    #[arg(long, global = true, env = "MIGTRACK_RPC_URL")]
    rpc_url: Option<String>,

    /// Storage backend URL
    #[arg(long, global = true, env = "MIGTRACK_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print command output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass up to the current head
    Sync {
        /// Start at the migration contract's deployment block
        #[arg(long, conflicts_with = "genesis")]
        full: bool,
        /// Start at block 0
        #[arg(long)]
        genesis: bool,
        /// Explicit first block
        #[arg(long)]
        from: Option<u64>,
        /// Explicit last block (clamped to the head)
        #[arg(long)]
        to: Option<u64>,
    },

    /// Run incremental passes until interrupted
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },

    /// Find the block a contract was deployed in
    Locate {
        /// Contract address (default: the migration contract)
        #[arg(long)]
        address: Option<String>,
    },

    /// Read the migration deadline from the migration contract
    Deadline,

    /// Show the sync cursor and stored event count
    Status,

    /// Aggregate statistics over all stored events
    Stats {
        /// Number of largest migrations to list
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Window for the migration rate, in days of activity
        #[arg(long, default_value_t = 7)]
        rate_days: u32,
    },

    /// Everything one address has migrated
    Lookup {
        address: String,
    },

    /// Migrations of at least `threshold` tokens, largest first
    Large {
        /// Display amount, e.g. 100000 or 2.5
        #[arg(long)]
        threshold: String,
    },

    /// Most recent migrations
    Timeline {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Per-day activity with running totals
    Daily {
        /// Show recorded daily snapshots instead
        #[arg(long)]
        snapshots: bool,
    },

    /// Delete all stored events and reset the cursor
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// Resolved configuration plus lazily built handles.
pub(crate) struct App {
    pub config: AppConfig,
    pub json: bool,
}

impl App {
    pub fn gateway(&self) -> Result<Arc<dyn LogGateway>> {
        let client = HttpRpcClient::new(self.config.rpc.url.clone(), self.config.rpc.request_timeout())
            .context("building RPC client")?;
        Ok(Arc::new(RpcGateway::new(client, self.config.rpc.gateway())))
    }

    pub async fn store(&self) -> Result<Arc<dyn MigrationStore>> {
        migtrack_storage::connect(&self.config.storage.url)
            .await
            .with_context(|| format!("opening storage '{}'", self.config.storage.url))
    }

    /// Print `value` as pretty JSON.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.rpc_url {
        config.rpc.url = url.clone();
    }
    if let Some(url) = &cli.database_url {
        config.storage.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if cli.log_json {
        config.log.json = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init_tracing(&config.log);

    let app = App { config, json: cli.json };

    match cli.command {
        Commands::Sync { full, genesis, from, to } => cmd_sync::sync(&app, full, genesis, from, to).await,
        Commands::Watch { interval_secs } => cmd_sync::watch(&app, interval_secs).await,
        Commands::Locate { address } => cmd_sync::locate(&app, address.as_deref()).await,
        Commands::Deadline => cmd_sync::deadline(&app).await,
        Commands::Reset { yes } => cmd_sync::reset(&app, yes).await,

        Commands::Status => cmd_query::status(&app).await,
        Commands::Stats { top, rate_days } => cmd_query::stats(&app, top, rate_days).await,
        Commands::Lookup { address } => cmd_query::lookup(&app, &address).await,
        Commands::Large { threshold } => cmd_query::large(&app, &threshold).await,
        Commands::Timeline { limit } => cmd_query::timeline(&app, limit).await,
        Commands::Daily { snapshots } => cmd_query::daily(&app, snapshots).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_file_values() {
        let cli = Cli::parse_from([
            "migtrack",
            "--rpc-url",
            "http://localhost:8545",
            "--database-url",
            "memory",
            "--log-level",
            "debug",
            "sync",
            "--genesis",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.rpc.url, "http://localhost:8545");
        assert_eq!(config.storage.url, "memory");
        assert_eq!(config.log.level, "debug");
        assert!(matches!(cli.command, Commands::Sync { genesis: true, full: false, .. }));
    }

    #[test]
    fn full_and_genesis_conflict() {
        assert!(Cli::try_parse_from(["migtrack", "sync", "--full", "--genesis"]).is_err());
    }
}
