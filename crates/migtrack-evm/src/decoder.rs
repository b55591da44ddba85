//! Raw log → [`MigrationEvent`].
//!
//! Decoding dispatches on `topics[0]` to an [`EventLayout`] that says where
//! the sender, recipient and amount live. The shape step is pure; the
//! enrichment step adds the block timestamp and the source tag, and never
//! fails the event.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::U256;
use serde::Serialize;
use tracing::{debug, warn};

use migtrack_core::error::DecodeError;
use migtrack_core::indexer::TokenConfig;
use migtrack_core::types::{MigrationEvent, SourceChain};
use migtrack_rpc::{LogFilter, LogGateway, RawLog, TopicFilter};

use crate::abi::{address_topic, event_topic, word_to_address};
use crate::classifier::{SourceClassifier, StaticClassifier};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const MIGRATED_SIGNATURE: &str = "Migrated(address,uint256,uint256)";

// ─── Layouts ─────────────────────────────────────────────────────────────────

/// Where a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLoc {
    /// `topics[i]`.
    Topic(usize),
    /// The `i`-th 32-byte word of `data`.
    DataWord(usize),
    /// The address of the contract that emitted the log.
    Emitter,
}

/// How to read a migration out of one event shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLayout {
    pub signature: String,
    /// `keccak256(signature)`, lower-case hex.
    pub topic0: String,
    pub from: FieldLoc,
    pub to: FieldLoc,
    pub amount: FieldLoc,
}

impl EventLayout {
    pub fn new(signature: impl Into<String>, from: FieldLoc, to: FieldLoc, amount: FieldLoc) -> Self {
        let signature = signature.into();
        Self {
            topic0: event_topic(&signature),
            signature,
            from,
            to,
            amount,
        }
    }

    /// ERC-20 `Transfer`: sender and recipient indexed, amount in data.
    pub fn transfer() -> Self {
        Self::new(TRANSFER_SIGNATURE, FieldLoc::Topic(1), FieldLoc::Topic(2), FieldLoc::DataWord(0))
    }

    /// The migration contract's own `Migrated(user, amount, minted)` event.
    /// The recipient is the contract itself.
    pub fn migrated() -> Self {
        Self::new(MIGRATED_SIGNATURE, FieldLoc::Topic(1), FieldLoc::Emitter, FieldLoc::DataWord(0))
    }

    /// Topics a log needs for this layout, `topics[0]` included.
    pub fn min_topics(&self) -> usize {
        [self.from, self.to, self.amount]
            .iter()
            .filter_map(|loc| match loc {
                FieldLoc::Topic(i) => Some(i + 1),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }
}

/// The `eth_getLogs` filter for transfers of `token.token_address` into the
/// migration contract: `[Transfer, any sender, migration contract]`.
pub fn migration_filter(token: &TokenConfig) -> LogFilter {
    LogFilter::new()
        .address(token.token_address.to_lowercase())
        .topic(TopicFilter::Exact(event_topic(TRANSFER_SIGNATURE)))
        .topic(TopicFilter::Any)
        .topic(TopicFilter::Exact(address_topic(&token.migration_contract)))
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// A log that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub tx_hash: String,
    pub log_index: String,
    #[serde(serialize_with = "as_display")]
    pub error: DecodeError,
}

fn as_display<S: serde::Serializer>(e: &DecodeError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(e)
}

/// Result of decoding a batch: successes and failures, never an abort.
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub events: Vec<MigrationEvent>,
    pub failures: Vec<DecodeFailure>,
}

// ─── EventDecoder ────────────────────────────────────────────────────────────

pub struct EventDecoder {
    layouts: HashMap<String, EventLayout>,
    decimals: u8,
    gateway: Arc<dyn LogGateway>,
    classifier: Arc<dyn SourceClassifier>,
}

impl EventDecoder {
    /// A decoder with the built-in `Transfer` and `Migrated` layouts and
    /// classification switched off.
    pub fn new(gateway: Arc<dyn LogGateway>, decimals: u8) -> Self {
        let decoder = Self {
            layouts: HashMap::new(),
            decimals,
            gateway,
            classifier: Arc::new(StaticClassifier::default()),
        };
        decoder
            .with_layout(EventLayout::transfer())
            .with_layout(EventLayout::migrated())
    }

    pub fn with_layout(mut self, layout: EventLayout) -> Self {
        self.layouts.insert(layout.topic0.clone(), layout);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn SourceClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Decode the log's shape only: no timestamp, source `Unknown`.
    pub fn decode_shape(&self, raw: &RawLog) -> Result<MigrationEvent, DecodeError> {
        if raw.is_removed() {
            return Err(DecodeError::Removed);
        }
        let topic0 = raw.topics.first().ok_or(DecodeError::MissingSignature)?;
        let layout = self
            .layouts
            .get(&topic0.to_lowercase())
            .ok_or_else(|| DecodeError::UnknownSignature { topic0: topic0.clone() })?;

        let expected = layout.min_topics();
        if raw.topics.len() < expected {
            return Err(DecodeError::TooFewTopics {
                expected,
                actual: raw.topics.len(),
            });
        }

        let topics = raw
            .topics
            .iter()
            .enumerate()
            .map(|(i, t)| decode_word(t, &format!("topics[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;
        let data = decode_hex(&raw.data, "data")?;

        let block_number = raw.block_number_u64().map_err(|e| DecodeError::InvalidHex {
            field: "blockNumber".into(),
            reason: e.to_string(),
        })?;
        let log_index = raw.log_index_u32().map_err(|e| DecodeError::InvalidHex {
            field: "logIndex".into(),
            reason: e.to_string(),
        })?;

        Ok(MigrationEvent {
            tx_hash: raw.tx_hash.to_lowercase(),
            log_index,
            from_address: read_address(layout.from, raw, &topics, &data, "from")?,
            to_address: read_address(layout.to, raw, &topics, &data, "to")?,
            amount_raw: read_amount(layout.amount, raw, &topics, &data)?,
            decimals: self.decimals,
            block_number,
            block_timestamp: None,
            source_chain: SourceChain::Unknown,
        })
    }

    /// Decode one log, looking up its block timestamp and source tag.
    pub async fn decode(&self, raw: &RawLog) -> Result<MigrationEvent, DecodeError> {
        let mut event = self.decode_shape(raw)?;
        event.block_timestamp = self.block_timestamp(event.block_number).await;
        event.source_chain = self.classifier.classify(&event.tx_hash).await;
        Ok(event)
    }

    /// Decode every log; header lookups and classifications are done once per
    /// block / transaction.
    pub async fn decode_batch(&self, logs: &[RawLog]) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        let mut timestamps: HashMap<u64, Option<i64>> = HashMap::new();
        let mut sources: HashMap<String, SourceChain> = HashMap::new();

        for raw in logs {
            let mut event = match self.decode_shape(raw) {
                Ok(event) => event,
                Err(error) => {
                    debug!(tx = %raw.tx_hash, log_index = %raw.log_index, %error, "log not decoded");
                    outcome.failures.push(DecodeFailure {
                        tx_hash: raw.tx_hash.clone(),
                        log_index: raw.log_index.clone(),
                        error,
                    });
                    continue;
                }
            };

            event.block_timestamp = match timestamps.get(&event.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self.block_timestamp(event.block_number).await;
                    timestamps.insert(event.block_number, ts);
                    ts
                }
            };
            event.source_chain = match sources.get(&event.tx_hash) {
                Some(source) => *source,
                None => {
                    let source = self.classifier.classify(&event.tx_hash).await;
                    sources.insert(event.tx_hash.clone(), source);
                    source
                }
            };
            outcome.events.push(event);
        }
        outcome
    }

    async fn block_timestamp(&self, block: u64) -> Option<i64> {
        match self.gateway.block_header(block).await {
            Ok(Some(header)) => Some(header.timestamp),
            Ok(None) => {
                warn!(block, "block header not found, timestamp left empty");
                None
            }
            Err(e) => {
                warn!(block, error = %e, "block header lookup failed, timestamp left empty");
                None
            }
        }
    }
}

// ─── Field extraction ────────────────────────────────────────────────────────

fn decode_hex(s: &str, field: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex {
        field: field.into(),
        reason: e.to_string(),
    })
}

fn decode_word(s: &str, field: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = decode_hex(s, field)?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidHex {
            field: field.into(),
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(bytes)
}

fn word_at<'a>(loc: FieldLoc, topics: &'a [Vec<u8>], data: &'a [u8]) -> Option<&'a [u8]> {
    match loc {
        FieldLoc::Topic(i) => topics.get(i).map(Vec::as_slice),
        FieldLoc::DataWord(i) => data.get(i * 32..(i + 1) * 32),
        FieldLoc::Emitter => None,
    }
}

fn read_address(
    loc: FieldLoc,
    raw: &RawLog,
    topics: &[Vec<u8>],
    data: &[u8],
    field: &str,
) -> Result<String, DecodeError> {
    if loc == FieldLoc::Emitter {
        return Ok(raw.address.to_lowercase());
    }
    word_at(loc, topics, data)
        .map(word_to_address)
        .ok_or_else(|| DecodeError::InvalidHex {
            field: field.into(),
            reason: format!("no 32-byte word at {loc:?} ({} data bytes)", data.len()),
        })
}

fn read_amount(loc: FieldLoc, raw: &RawLog, topics: &[Vec<u8>], data: &[u8]) -> Result<U256, DecodeError> {
    if loc == FieldLoc::Emitter {
        return Err(DecodeError::InvalidAmount(format!(
            "amount cannot be read from the emitter {}",
            raw.address
        )));
    }
    word_at(loc, topics, data)
        .map(U256::from_be_slice)
        .ok_or_else(|| DecodeError::InvalidAmount(format!("data has {} bytes, need a word at {loc:?}", data.len())))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
