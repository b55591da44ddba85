//! Scriptable in-memory chain implementing [`LogGateway`].
//!
//! Compiled for this crate's tests and with the `testing` feature. Block
//! `n` has timestamp `GENESIS_TIMESTAMP + n` unless its header is made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::U256;
use async_trait::async_trait;

use migtrack_rpc::types::{to_hex_quantity, BlockHeader, LogFilter, RawLog, TopicFilter, TxReceipt};
use migtrack_rpc::{JsonRpcError, LogGateway, TransportError};

use crate::abi::{address_topic, event_topic};

/// Timestamp of block 0 (2024-01-01T00:00:00Z).
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

#[derive(Default)]
struct ChainState {
    height: u64,
    logs: Vec<RawLog>,
    deployments: HashMap<String, u64>,
    failing_logs: Vec<(u64, u64)>,
    failing_headers: HashSet<u64>,
    receipts: HashMap<String, TxReceipt>,
    failing_receipts: HashSet<String>,
    call_results: HashMap<[u8; 4], Vec<u8>>,
}

/// An in-memory chain.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    code_probes: AtomicU64,
    logs_calls: AtomicU64,
    header_calls: AtomicU64,
}

fn injected(method: &str) -> TransportError {
    TransportError::RetriesExhausted {
        method: method.into(),
        attempts: 3,
        last: Box::new(TransportError::Http("injected failure".into())),
    }
}

fn topic_matches(filter: &TopicFilter, topic: Option<&String>) -> bool {
    match (filter, topic) {
        (TopicFilter::Any, _) => true,
        (_, None) => false,
        (TopicFilter::Exact(want), Some(t)) => want.eq_ignore_ascii_case(t),
        (TopicFilter::OneOf(wants), Some(t)) => wants.iter().any(|w| w.eq_ignore_ascii_case(t)),
    }
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        let chain = Self::default();
        chain.state().height = height;
        chain
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }

    pub fn add_log(&self, log: RawLog) {
        self.state().logs.push(log);
    }

    /// Code appears at `address` from `block` onwards.
    pub fn deploy(&self, address: &str, block: u64) {
        self.state().deployments.insert(address.to_lowercase(), block);
    }

    /// `eth_getLogs` calls overlapping `[from, to]` fail as if retries ran out.
    pub fn fail_logs(&self, from: u64, to: u64) {
        self.state().failing_logs.push((from, to));
    }

    pub fn heal_logs(&self) {
        self.state().failing_logs.clear();
    }

    pub fn fail_header(&self, block: u64) {
        self.state().failing_headers.insert(block);
    }

    pub fn add_receipt(&self, receipt: TxReceipt) {
        self.state().receipts.insert(receipt.tx_hash.to_lowercase(), receipt);
    }

    pub fn fail_receipt(&self, tx_hash: &str) {
        self.state().failing_receipts.insert(tx_hash.to_lowercase());
    }

    /// `eth_call` with this selector returns `result`; other selectors revert.
    pub fn set_call_result(&self, selector: [u8; 4], result: Vec<u8>) {
        self.state().call_results.insert(selector, result);
    }

    /// `eth_getCode` calls since the last reset.
    pub fn code_probes(&self) -> u64 {
        self.code_probes.load(Ordering::Relaxed)
    }

    pub fn logs_calls(&self) -> u64 {
        self.logs_calls.load(Ordering::Relaxed)
    }

    pub fn header_calls(&self) -> u64 {
        self.header_calls.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.code_probes.store(0, Ordering::Relaxed);
        self.logs_calls.store(0, Ordering::Relaxed);
        self.header_calls.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl LogGateway for MockChain {
    async fn block_height(&self) -> Result<u64, TransportError> {
        Ok(self.state().height)
    }

    async fn logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        self.logs_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state();
        if state.failing_logs.iter().any(|(lo, hi)| *lo <= to && from <= *hi) {
            return Err(injected("eth_getLogs"));
        }

        let mut logs: Vec<RawLog> = state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number_u64().unwrap_or(u64::MAX);
                from <= block && block <= to
            })
            .filter(|log| {
                filter
                    .address
                    .as_ref()
                    .map_or(true, |a| a.eq_ignore_ascii_case(&log.address))
            })
            .filter(|log| {
                filter
                    .topics
                    .iter()
                    .enumerate()
                    .all(|(i, f)| topic_matches(f, log.topics.get(i)))
            })
            .cloned()
            .collect();
        logs.sort_by_key(|l| {
            (
                l.block_number_u64().unwrap_or(u64::MAX),
                l.log_index_u32().unwrap_or(u32::MAX),
            )
        });
        Ok(logs)
    }

    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, TransportError> {
        self.header_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state();
        if state.failing_headers.contains(&number) {
            return Err(injected("eth_getBlockByNumber"));
        }
        if number > state.height {
            return Ok(None);
        }
        Ok(Some(BlockHeader {
            number,
            hash: format!("0x{number:064x}"),
            parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
            timestamp: GENESIS_TIMESTAMP + number as i64,
        }))
    }

    async fn code_at(&self, address: &str, block: u64) -> Result<Vec<u8>, TransportError> {
        self.code_probes.fetch_add(1, Ordering::Relaxed);
        let deployed = self.state().deployments.get(&address.to_lowercase()).copied();
        match deployed {
            Some(at) if block >= at => Ok(vec![0x60, 0x80, 0x60, 0x40]),
            _ => Ok(vec![]),
        }
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, TransportError> {
        let state = self.state();
        let key = tx_hash.to_lowercase();
        if state.failing_receipts.contains(&key) {
            return Err(injected("eth_getTransactionReceipt"));
        }
        Ok(state.receipts.get(&key).cloned())
    }

    async fn call(&self, _to: &str, data: &[u8], _block: Option<u64>) -> Result<Vec<u8>, TransportError> {
        let selector: Option<[u8; 4]> = data.get(..4).and_then(|s| s.try_into().ok());
        let result = selector.and_then(|s| self.state().call_results.get(&s).cloned());
        result.ok_or_else(|| {
            TransportError::Rpc(JsonRpcError {
                code: 3,
                message: "execution reverted".into(),
                data: None,
            })
        })
    }
}

// ─── Log builders ────────────────────────────────────────────────────────────

/// A `Transfer(address,address,uint256)` log emitted by `token`.
pub fn transfer_log(
    token: &str,
    block: u64,
    log_index: u32,
    tx_hash: &str,
    from: &str,
    to: &str,
    amount: U256,
) -> RawLog {
    RawLog {
        address: token.to_lowercase(),
        topics: vec![
            event_topic("Transfer(address,address,uint256)"),
            address_topic(from),
            address_topic(to),
        ],
        data: format!("0x{}", hex::encode(amount.to_be_bytes::<32>())),
        block_number: to_hex_quantity(block),
        block_hash: Some(format!("0x{block:064x}")),
        tx_hash: tx_hash.to_lowercase(),
        log_index: to_hex_quantity(log_index as u64),
        removed: None,
    }
}

/// A `Migrated(address,uint256,uint256)` log emitted by the migration contract.
pub fn migrated_log(
    contract: &str,
    block: u64,
    log_index: u32,
    tx_hash: &str,
    user: &str,
    amount: U256,
    minted: U256,
) -> RawLog {
    RawLog {
        address: contract.to_lowercase(),
        topics: vec![event_topic("Migrated(address,uint256,uint256)"), address_topic(user)],
        data: format!(
            "0x{}{}",
            hex::encode(amount.to_be_bytes::<32>()),
            hex::encode(minted.to_be_bytes::<32>())
        ),
        block_number: to_hex_quantity(block),
        block_hash: Some(format!("0x{block:064x}")),
        tx_hash: tx_hash.to_lowercase(),
        log_index: to_hex_quantity(log_index as u64),
        removed: None,
    }
}
