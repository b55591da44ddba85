//! Commands that talk to the chain: sync, watch, locate, deadline, reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use migtrack_evm::{DeadlineProbe, DeploymentLocator, SyncEngine, SyncMode, SyncOptions, SyncReport};

use crate::config::is_address;
use crate::App;

/// Set the engine's stop flag on Ctrl-C.
fn stop_on_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current sub-range");
            stop.store(true, Ordering::Relaxed);
        }
    });
}

async fn engine(app: &App) -> Result<SyncEngine> {
    let engine = SyncEngine::new(
        app.gateway()?,
        app.store().await?,
        app.config.token.clone(),
        app.config.sync.clone(),
    );
    stop_on_ctrl_c(engine.stop_handle());
    Ok(engine)
}

pub async fn sync(app: &App, full: bool, genesis: bool, from: Option<u64>, to: Option<u64>) -> Result<()> {
    let mode = if genesis {
        SyncMode::Genesis
    } else if full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };
    let engine = engine(app).await?;
    let report = engine
        .run(SyncOptions { mode, from, to })
        .await
        .context("sync pass failed")?;

    if app.json {
        app.print_json(&report)?;
    } else {
        print_report(&report);
    }
    check_complete(&report)
}

/// An incomplete pass is a failure for the exit status; a cancelled one is not.
fn check_complete(report: &SyncReport) -> Result<()> {
    if report.complete || report.cancelled {
        return Ok(());
    }
    warn!(failed = report.failed_ranges.len(), "pass incomplete, rerun to fill the gaps");
    bail!(
        "sync pass incomplete: cursor {} of target {}, {} failed sub-range(s)",
        report.cursor,
        report.target,
        report.failed_ranges.len()
    )
}

fn print_report(r: &SyncReport) {
    println!("Sync pass ({:?})", r.mode);
    println!("  Blocks:          {} → {} ({} sub-ranges)", r.from, r.target, r.ranges);
    println!("  Logs fetched:    {}", r.logs_fetched);
    println!("  Events decoded:  {} ({} skipped)", r.events_decoded, r.decode_failures);
    println!("  Inserted:        {} ({} already stored)", r.inserted, r.duplicates);
    println!("  Cursor:          {}", r.cursor);
    if !r.failed_ranges.is_empty() {
        println!("  Failed ranges:");
        for range in &r.failed_ranges {
            println!("    {range}");
        }
    }
    let status = if r.cancelled {
        "cancelled"
    } else if r.complete {
        "complete"
    } else {
        "incomplete"
    };
    println!("  Status:          {status}");
}

pub async fn watch(app: &App, interval_secs: u64) -> Result<()> {
    let engine = engine(app).await?;
    info!(interval_secs, "watching for new migrations (Ctrl-C to stop)");
    engine
        .watch(Duration::from_secs(interval_secs.max(1)))
        .await
        .context("watch loop failed")
}

pub async fn locate(app: &App, address: Option<&str>) -> Result<()> {
    let address = address.unwrap_or(&app.config.token.migration_contract);
    if !is_address(address) {
        bail!("not an address: {address}");
    }
    let locator = DeploymentLocator::new(app.gateway()?);
    let block = locator
        .locate(address)
        .await
        .with_context(|| format!("locating deployment of {address}"))?;

    if app.json {
        return app.print_json(&serde_json::json!({
            "address": address,
            "deployment_block": block,
            "probes": locator.probes(),
        }));
    }
    match block {
        Some(block) => println!("{address} deployed at block {block} ({} probes)", locator.probes()),
        None => println!("{address} has no code at the current head"),
    }
    Ok(())
}

pub async fn deadline(app: &App) -> Result<()> {
    let contract = &app.config.token.migration_contract;
    let probe = DeadlineProbe::new(app.gateway()?);
    let deadline = probe
        .probe(contract)
        .await
        .context("reading migration deadline")?;

    if app.json {
        return app.print_json(&deadline);
    }
    match deadline {
        Some(d) => {
            let remaining = d.remaining_secs(Utc::now());
            println!("Deadline ({}): {}", d.getter, d.at.to_rfc3339());
            if remaining > 0 {
                println!("  {}d {}h remaining", remaining / 86_400, (remaining % 86_400) / 3_600);
            } else {
                println!("  passed");
            }
        }
        None => println!("{contract} exposes no deadline getter"),
    }
    Ok(())
}

pub async fn reset(app: &App, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to delete stored events without --yes");
    }
    let store = app.store().await?;
    let count = store.event_count().await?;
    store.reset().await.context("resetting store")?;
    info!(deleted = count, "store reset");
    if app.json {
        return app.print_json(&serde_json::json!({ "deleted": count }));
    }
    println!("Deleted {count} events; cursor reset to 0");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migtrack_core::range::BlockRange;

    #[test]
    fn incomplete_pass_fails_the_command() {
        let report = SyncReport {
            target: 250,
            cursor: 199,
            failed_ranges: vec![BlockRange::new(200, 250)],
            ..SyncReport::default()
        };
        let err = check_complete(&report).unwrap_err();
        assert!(err.to_string().contains("cursor 199 of target 250"));
    }

    #[test]
    fn complete_or_cancelled_pass_succeeds() {
        let complete = SyncReport {
            complete: true,
            ..SyncReport::default()
        };
        assert!(check_complete(&complete).is_ok());

        let cancelled = SyncReport {
            cancelled: true,
            ..SyncReport::default()
        };
        assert!(check_complete(&cancelled).is_ok());
    }
}
