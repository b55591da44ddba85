//! Chain data returned by the gateway, plus the `eth_getLogs` filter.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransportError;

// ─── Quantities ──────────────────────────────────────────────────────────────

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, TransportError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Err(TransportError::InvalidResponse(format!("empty hex quantity '{s}'")));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| TransportError::InvalidResponse(format!("bad hex quantity '{s}': {e}")))
}

/// Encode a block number as a JSON-RPC hex quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// Decode `0x`-prefixed hex bytes (`"0x"` is empty).
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, TransportError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| TransportError::InvalidResponse(format!("bad hex data: {e}")))
}

// ─── Logs ────────────────────────────────────────────────────────────────────

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, TransportError> {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> Result<u32, TransportError> {
        let idx = parse_hex_u64(&self.log_index)?;
        u32::try_from(idx)
            .map_err(|_| TransportError::InvalidResponse(format!("log index {idx} out of range")))
    }

    /// Returns `true` if the node flagged this log as removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Constraint on one topic position of an `eth_getLogs` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Matches anything (`null`).
    Any,
    Exact(String),
    /// Matches any of the listed topics (JSON array).
    OneOf(Vec<String>),
}

impl TopicFilter {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Any => Value::Null,
            Self::Exact(t) => Value::String(t.clone()),
            Self::OneOf(ts) => json!(ts),
        }
    }
}

/// Address and topic constraints for `eth_getLogs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<String>,
    pub topics: Vec<TopicFilter>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn topic(mut self, topic: TopicFilter) -> Self {
        self.topics.push(topic);
        self
    }

    /// The `eth_getLogs` parameter object for `[from, to]`.
    ///
    /// Trailing `Any` positions are dropped; some nodes reject them.
    pub fn to_params(&self, from: u64, to: u64) -> Value {
        let keep = self
            .topics
            .iter()
            .rposition(|t| *t != TopicFilter::Any)
            .map_or(0, |i| i + 1);

        let mut params = json!({
            "fromBlock": to_hex_quantity(from),
            "toBlock": to_hex_quantity(to),
        });
        if let Some(address) = &self.address {
            params["address"] = Value::String(address.clone());
        }
        if keep > 0 {
            let topics: Vec<Value> = self.topics[..keep].iter().map(TopicFilter::to_json).collect();
            params["topics"] = Value::Array(topics);
        }
        params
    }
}

// ─── Blocks and receipts ─────────────────────────────────────────────────────

/// The header fields the indexer uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// UNIX seconds.
    pub timestamp: i64,
}

impl BlockHeader {
    /// Parse an `eth_getBlockByNumber` result object.
    pub fn from_json(v: &Value) -> Result<Self, TransportError> {
        let field = |name: &str| {
            v[name]
                .as_str()
                .ok_or_else(|| TransportError::InvalidResponse(format!("block is missing '{name}'")))
        };
        Ok(Self {
            number: parse_hex_u64(field("number")?)?,
            hash: field("hash")?.to_string(),
            parent_hash: field("parentHash")?.to_string(),
            timestamp: parse_hex_u64(field("timestamp")?)? as i64,
        })
    }
}

/// A log entry inside a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// The receipt fields the source classifier needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    /// `0x1` success, `0x0` reverted; absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() != Some("0x0")
    }

    /// `topics[0]` of every log in the receipt.
    pub fn event_signatures(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().filter_map(|l| l.topics.first().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert!(parse_hex_u64("0x").is_err());
        assert!(parse_hex_u64("0xzz").is_err());
        assert_eq!(to_hex_quantity(255), "0xff");
        assert_eq!(to_hex_quantity(0), "0x0");
    }

    #[test]
    fn raw_log_from_node_json() {
        let log: RawLog = serde_json::from_value(json!({
            "address": "0xe90fe2de4a415ad48b6dcec08ba6ae98231948ac",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockNumber": "0x12a05f200",
            "blockHash": "0xab",
            "transactionHash": "0xcd",
            "logIndex": "0x5",
            "transactionIndex": "0x0"
        }))
        .unwrap();
        assert_eq!(log.block_number_u64().unwrap(), 5_000_000_000);
        assert_eq!(log.log_index_u32().unwrap(), 5);
        assert!(!log.is_removed());
    }

    #[test]
    fn topic_filter_json_shape() {
        let filter = LogFilter::new()
            .address("0xtoken")
            .topic(TopicFilter::Exact("0xsig".into()))
            .topic(TopicFilter::Any)
            .topic(TopicFilter::OneOf(vec!["0xa".into(), "0xb".into()]));
        let params = filter.to_params(16, 31);
        assert_eq!(params["fromBlock"], "0x10");
        assert_eq!(params["toBlock"], "0x1f");
        assert_eq!(params["address"], "0xtoken");
        assert_eq!(params["topics"], json!(["0xsig", null, ["0xa", "0xb"]]));
    }

    #[test]
    fn trailing_wildcards_are_trimmed() {
        let filter = LogFilter::new()
            .topic(TopicFilter::Exact("0xsig".into()))
            .topic(TopicFilter::Any)
            .topic(TopicFilter::Any);
        assert_eq!(filter.to_params(0, 1)["topics"], json!(["0xsig"]));

        let all_any = LogFilter::new().topic(TopicFilter::Any);
        assert!(all_any.to_params(0, 1).get("topics").is_none());
    }

    #[test]
    fn block_header_from_json() {
        let header = BlockHeader::from_json(&json!({
            "number": "0x1f4",
            "hash": "0xbeef",
            "parentHash": "0xdead",
            "timestamp": "0x65920080"
        }))
        .unwrap();
        assert_eq!(header.number, 500);
        assert_eq!(header.timestamp, 1_704_067_200);
        assert!(BlockHeader::from_json(&json!({"number": "0x1"})).is_err());
    }

    #[test]
    fn receipt_signatures() {
        let receipt: TxReceipt = serde_json::from_value(json!({
            "transactionHash": "0xcd",
            "blockNumber": "0x10",
            "status": "0x1",
            "logs": [
                {"address": "0x1", "topics": ["0xaaa", "0x01"], "data": "0x"},
                {"address": "0x2", "topics": [], "data": "0x"}
            ]
        }))
        .unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.event_signatures().collect::<Vec<_>>(), vec!["0xaaa"]);
    }
}
