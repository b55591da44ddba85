//! The sync orchestrator: one catch-up pass from the cursor to the head.
//!
//! # Pass
//! 1. Determine the first block (cursor, configured start, located
//!    deployment, or genesis) and the target (head observed at pass start
//!    minus the confirmation depth).
//! 2. Split `[from, target]` into sub-ranges; fetch and decode up to
//!    `concurrency` of them at once, consuming results strictly in order.
//! 3. Per sub-range: upsert its events as one batch, then advance the cursor
//!    to the sub-range end, unless an earlier sub-range of this pass failed.
//!
//! A failed fetch does not stop the pass; it freezes the cursor so the next
//! incremental pass re-scans from the gap. Re-scanning is safe because the
//! store's upsert is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use migtrack_core::cursor::{CursorUpdate, SyncCursor};
use migtrack_core::error::IndexerError;
use migtrack_core::indexer::{SyncConfig, SyncState, TokenConfig};
use migtrack_core::range::{split_range, BlockRange};
use migtrack_core::store::{DailySnapshot, MigrationStore};
use migtrack_rpc::{LogFilter, LogGateway, TransportError};

use crate::classifier::{ReceiptClassifier, SourceClassifier, StaticClassifier};
use crate::decoder::{migration_filter, DecodeOutcome, EventDecoder};
use crate::locator::DeploymentLocator;

fn remote(e: TransportError) -> IndexerError {
    IndexerError::Remote(e.to_string())
}

/// Where a pass starts when no explicit `from` is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Resume after the cursor; a fresh store starts at `start_block`.
    #[default]
    Incremental,
    /// Start at the migration contract's deployment block (or `start_block`
    /// if that is later or the contract cannot be located).
    Full,
    /// Start at block 0.
    Genesis,
}

/// Per-pass overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub from: Option<u64>,
    /// Upper bound; clamped to the observed head.
    pub to: Option<u64>,
}

impl SyncOptions {
    pub fn mode(mode: SyncMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// What a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub from: u64,
    pub target: u64,
    /// Sub-ranges planned for the pass.
    pub ranges: usize,
    pub logs_fetched: u64,
    pub events_decoded: u64,
    pub decode_failures: u64,
    pub inserted: u64,
    /// Decoded events that were already stored.
    pub duplicates: u64,
    pub failed_ranges: Vec<BlockRange>,
    /// Cursor after the pass.
    pub cursor: u64,
    /// No failed sub-range, not cancelled, and the cursor reached the target.
    pub complete: bool,
    pub cancelled: bool,
}

struct ScannedRange {
    range: BlockRange,
    fetched: Result<(u64, DecodeOutcome), TransportError>,
}

/// Drives sync passes against one gateway and one store.
pub struct SyncEngine {
    config: SyncConfig,
    token: TokenConfig,
    gateway: Arc<dyn LogGateway>,
    store: Arc<dyn MigrationStore>,
    decoder: EventDecoder,
    filter: LogFilter,
    stop: Arc<AtomicBool>,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(
        gateway: Arc<dyn LogGateway>,
        store: Arc<dyn MigrationStore>,
        token: TokenConfig,
        config: SyncConfig,
    ) -> Self {
        let classifier: Arc<dyn SourceClassifier> = if config.classify_sources {
            Arc::new(ReceiptClassifier::new(gateway.clone(), &config.bridge_signatures))
        } else {
            Arc::new(StaticClassifier::default())
        };
        let decoder = EventDecoder::new(gateway.clone(), token.decimals).with_classifier(classifier);

        Self {
            filter: migration_filter(&token),
            decoder,
            config,
            token,
            gateway,
            store,
            stop: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Replace the decoder (custom layouts or classifier).
    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the `eth_getLogs` filter.
    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Share an externally owned stop flag.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Setting the returned flag cancels the running pass at the next
    /// sub-range boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn fail(&self, e: IndexerError) -> IndexerError {
        self.set_state(SyncState::Failed);
        e
    }

    /// Run one incremental pass.
    pub async fn run_incremental(&self) -> Result<SyncReport, IndexerError> {
        self.run(SyncOptions::default()).await
    }

    /// Run one pass.
    ///
    /// Remote failures on individual sub-ranges are reported, not returned.
    /// An `Err` means the pass could not start (head or cursor unavailable)
    /// or the store failed.
    pub async fn run(&self, opts: SyncOptions) -> Result<SyncReport, IndexerError> {
        self.set_state(SyncState::DeterminingStart);

        let cursor = self.store.cursor().await.map_err(|e| self.fail(e))?;
        let from = match opts.from {
            Some(from) => from,
            None => self.start_block(opts.mode, &cursor).await,
        };
        let height = self
            .gateway
            .block_height()
            .await
            .map_err(|e| self.fail(remote(e)))?;
        let confirmed = height.saturating_sub(self.config.confirmation_depth);
        let target = opts.to.map_or(confirmed, |to| to.min(confirmed));

        let ranges = split_range(from, target, self.config.batch_size);
        let mut report = SyncReport {
            mode: opts.mode,
            from,
            target,
            ranges: ranges.len(),
            cursor: cursor.last_synced_block,
            ..SyncReport::default()
        };
        info!(mode = ?opts.mode, from, target, ranges = ranges.len(), "sync pass started");

        let mut scans = stream::iter(ranges)
            .map(|range| self.scan(range))
            .buffered(self.config.concurrency.max(1));

        loop {
            if self.stopped() {
                warn!(cursor = report.cursor, "sync pass cancelled");
                report.cancelled = true;
                break;
            }
            self.set_state(SyncState::ScanningBatch);
            let Some(scanned) = scans.next().await else {
                break;
            };
            self.commit(scanned, &mut report).await?;
        }
        drop(scans);

        report.cursor = self
            .store
            .cursor()
            .await
            .map_err(|e| self.fail(e))?
            .last_synced_block;
        report.complete =
            report.failed_ranges.is_empty() && !report.cancelled && report.cursor >= target;

        if self.config.record_snapshots && report.failed_ranges.is_empty() && !report.cancelled {
            self.record_snapshot().await;
        }

        self.set_state(SyncState::Idle);
        info!(
            from,
            target,
            fetched = report.logs_fetched,
            decoded = report.events_decoded,
            decode_failures = report.decode_failures,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed_ranges = report.failed_ranges.len(),
            cursor = report.cursor,
            complete = report.complete,
            "sync pass finished"
        );
        Ok(report)
    }

    /// Run incremental passes every `interval` until the stop flag is set.
    ///
    /// Remote errors that prevent a pass from starting are logged and retried
    /// on the next tick; store errors end the loop.
    pub async fn watch(&self, interval: Duration) -> Result<(), IndexerError> {
        while !self.stopped() {
            match self.run_incremental().await {
                Ok(report) if report.cancelled => break,
                Ok(_) => {}
                Err(e) if e.is_transient() => warn!(error = %e, "sync pass could not start"),
                Err(e) => return Err(e),
            }
            self.sleep_unless_stopped(interval).await;
        }
        info!("watch loop stopped");
        Ok(())
    }

    async fn sleep_unless_stopped(&self, interval: Duration) {
        let tick = Duration::from_millis(250);
        let mut slept = Duration::ZERO;
        while slept < interval && !self.stopped() {
            let step = tick.min(interval - slept);
            tokio::time::sleep(step).await;
            slept += step;
        }
    }

    async fn start_block(&self, mode: SyncMode, cursor: &SyncCursor) -> u64 {
        let configured = self.config.start_block;
        match mode {
            SyncMode::Incremental => cursor.resume_from(configured),
            SyncMode::Genesis => 0,
            SyncMode::Full => {
                let locator = DeploymentLocator::new(self.gateway.clone());
                match locator.locate(&self.token.migration_contract).await {
                    Ok(Some(deployed)) if deployed > configured => {
                        info!(block = deployed, probes = locator.probes(), "starting at deployment block");
                        deployed
                    }
                    Ok(Some(_)) => configured,
                    Ok(None) => {
                        warn!(
                            contract = %self.token.migration_contract,
                            "migration contract has no code, starting at configured block"
                        );
                        configured
                    }
                    Err(e) => {
                        warn!(error = %e, "deployment lookup failed, starting at configured block");
                        configured
                    }
                }
            }
        }
    }

    async fn scan(&self, range: BlockRange) -> ScannedRange {
        let fetched = match self.gateway.logs(range.from, range.to, &self.filter).await {
            Ok(logs) => {
                let outcome = self.decoder.decode_batch(&logs).await;
                Ok((logs.len() as u64, outcome))
            }
            Err(e) => Err(e),
        };
        ScannedRange { range, fetched }
    }

    async fn commit(&self, scanned: ScannedRange, report: &mut SyncReport) -> Result<(), IndexerError> {
        let range = scanned.range;
        let (fetched, outcome) = match scanned.fetched {
            Ok(ok) => ok,
            Err(e) => {
                warn!(%range, error = %e, "sub-range failed, cursor frozen for this pass");
                report.failed_ranges.push(range);
                return Ok(());
            }
        };

        for failure in &outcome.failures {
            warn!(tx = %failure.tx_hash, log_index = %failure.log_index, error = %failure.error, "log skipped");
        }
        let decoded = outcome.events.len() as u64;
        report.logs_fetched += fetched;
        report.events_decoded += decoded;
        report.decode_failures += outcome.failures.len() as u64;

        self.set_state(SyncState::PersistingBatch);
        let inserted = match self.store.upsert_batch(&outcome.events).await {
            Ok(n) => n,
            Err(e) => {
                error!(%range, error = %e, "persisting sub-range failed, aborting pass");
                return Err(self.fail(e));
            }
        };
        report.inserted += inserted;
        report.duplicates += decoded.saturating_sub(inserted);

        if report.failed_ranges.is_empty() {
            match self.store.advance_cursor(range.to).await.map_err(|e| self.fail(e))? {
                CursorUpdate::Advanced { .. } => {
                    self.set_state(SyncState::CursorAdvanced);
                    report.cursor = range.to;
                }
                CursorUpdate::Rejected { current } => {
                    warn!(%range, current, "cursor is already past this sub-range");
                    report.cursor = current;
                }
            }
        }

        info!(%range, fetched, decoded, inserted, cursor = report.cursor, "sub-range synced");
        Ok(())
    }

    async fn record_snapshot(&self) {
        let result = async {
            let aggregate = self.store.aggregate(0).await?;
            let snapshot = DailySnapshot::from_aggregate(Utc::now().date_naive(), &aggregate);
            self.store.record_daily_snapshot(snapshot).await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "daily snapshot not recorded");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{transfer_log, MockChain};
    use alloy_primitives::U256;
    use migtrack_core::types::MigrationEvent;
    use migtrack_storage::InMemoryStorage;

    const CONTRACT: &str = "0x99fe40e501151e92f10ac13ea1c06083ee170363";
    const ALICE: &str = "0x1111111111111111111111111111111111111111";

    fn token() -> TokenConfig {
        TokenConfig::default()
    }

    fn config(batch_size: u64) -> SyncConfig {
        SyncConfig {
            batch_size,
            classify_sources: false,
            record_snapshots: false,
            ..SyncConfig::default()
        }
    }

    fn seed(chain: &MockChain, blocks: impl IntoIterator<Item = u64>) {
        for b in blocks {
            chain.add_log(transfer_log(
                &token().token_address,
                b,
                0,
                &format!("0x{b:064x}"),
                ALICE,
                CONTRACT,
                U256::from(b + 1),
            ));
        }
    }

    fn engine(chain: &Arc<MockChain>, store: &Arc<InMemoryStorage>, cfg: SyncConfig) -> SyncEngine {
        SyncEngine::new(chain.clone(), store.clone(), token(), cfg)
    }

    #[tokio::test]
    async fn incremental_pass_syncs_to_head() {
        let chain = Arc::new(MockChain::new(349));
        seed(&chain, [100, 150, 250, 349]);
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { start_block: 100, ..config(100) });

        let report = e.run_incremental().await.unwrap();
        assert_eq!(report.from, 100);
        assert_eq!(report.target, 349);
        assert_eq!(report.ranges, 3);
        assert_eq!(report.inserted, 4);
        assert_eq!(report.cursor, 349);
        assert!(report.complete);
        assert_eq!(e.state(), SyncState::Idle);

        // nothing new: next pass starts after the cursor and scans nothing
        let again = e.run_incremental().await.unwrap();
        assert_eq!(again.from, 350);
        assert_eq!(again.ranges, 0);
        assert!(again.complete);
    }

    #[tokio::test]
    async fn failed_range_freezes_cursor() {
        let chain = Arc::new(MockChain::new(250));
        seed(&chain, [10, 120, 210, 240]);
        chain.fail_logs(200, 250);
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, config(100));

        let report = e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();
        assert_eq!(report.failed_ranges, vec![BlockRange::new(200, 250)]);
        assert_eq!(report.cursor, 199);
        assert!(!report.complete);
        assert_eq!(store.cursor().await.unwrap().last_synced_block, 199);
        assert_eq!(store.event_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ranges_after_a_failure_are_stored_but_cursor_stays() {
        let chain = Arc::new(MockChain::new(299));
        seed(&chain, [50, 150, 250]);
        chain.fail_logs(100, 199);
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, config(100));

        let report = e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();
        assert_eq!(report.cursor, 99);
        assert_eq!(report.inserted, 2);

        chain.heal_logs();
        let retry = e.run_incremental().await.unwrap();
        assert_eq!(retry.from, 100);
        assert_eq!(retry.inserted, 1);
        assert_eq!(retry.duplicates, 1);
        assert_eq!(retry.cursor, 299);
        assert!(retry.complete);
    }

    #[tokio::test]
    async fn concurrent_scans_commit_in_order() {
        let chain = Arc::new(MockChain::new(999));
        seed(&chain, (0..1_000).step_by(37));
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { concurrency: 4, ..config(50) });

        let report = e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();
        assert_eq!(report.ranges, 20);
        assert_eq!(report.inserted, 28);
        assert_eq!(report.cursor, 999);
        let events: Vec<MigrationEvent> = store.all_events().await.unwrap();
        assert!(events.windows(2).all(|w| w[0].block_number < w[1].block_number));
    }

    #[tokio::test]
    async fn full_mode_starts_at_deployment() {
        let chain = Arc::new(MockChain::new(1_000));
        chain.deploy(CONTRACT, 600);
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { start_block: 100, ..config(1_000) });

        let report = e.run(SyncOptions::mode(SyncMode::Full)).await.unwrap();
        assert_eq!(report.from, 600);

        // located block earlier than the configured start: configured wins
        let e = engine(&chain, &store, SyncConfig { start_block: 700, ..config(1_000) });
        assert_eq!(e.run(SyncOptions::mode(SyncMode::Full)).await.unwrap().from, 700);
    }

    #[tokio::test]
    async fn full_mode_falls_back_when_not_deployed() {
        let chain = Arc::new(MockChain::new(1_000));
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { start_block: 42, ..config(1_000) });
        assert_eq!(e.run(SyncOptions::mode(SyncMode::Full)).await.unwrap().from, 42);
    }

    #[tokio::test]
    async fn confirmation_depth_and_explicit_bounds() {
        let chain = Arc::new(MockChain::new(500));
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { confirmation_depth: 10, ..config(100) });

        let report = e
            .run(SyncOptions { mode: SyncMode::Genesis, from: Some(5), to: Some(10_000) })
            .await
            .unwrap();
        assert_eq!(report.from, 5);
        assert_eq!(report.target, 490);
    }

    #[tokio::test]
    async fn stop_flag_cancels_between_ranges() {
        let chain = Arc::new(MockChain::new(999));
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, config(100));
        e.stop_handle().store(true, Ordering::Relaxed);

        let report = e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();
        assert!(report.cancelled);
        assert!(!report.complete);
        assert_eq!(report.cursor, 0);
        assert_eq!(chain.logs_calls(), 0);
    }

    #[tokio::test]
    async fn rewind_below_cursor_is_ignored() {
        let chain = Arc::new(MockChain::new(300));
        seed(&chain, [20]);
        let store = Arc::new(InMemoryStorage::new());
        store.advance_cursor(300).await.unwrap();
        let e = engine(&chain, &store, config(100));

        let report = e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.cursor, 300);
        assert!(report.complete);
    }

    #[tokio::test]
    async fn records_daily_snapshot_after_clean_pass() {
        let chain = Arc::new(MockChain::new(100));
        seed(&chain, [1, 2, 3]);
        let store = Arc::new(InMemoryStorage::new());
        let e = engine(&chain, &store, SyncConfig { record_snapshots: true, ..config(100) });
        e.run(SyncOptions::mode(SyncMode::Genesis)).await.unwrap();

        let snapshots = store.daily_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total_events, 3);
    }
}
