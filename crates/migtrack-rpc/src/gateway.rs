//! The log gateway: typed chain queries over a retrying, rate-limited transport.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::policy::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};
use crate::request::JsonRpcRequest;
use crate::transport::RpcTransport;
use crate::types::{
    decode_hex_bytes, parse_hex_u64, to_hex_quantity, BlockHeader, LogFilter, RawLog, TxReceipt,
};

/// Read-only chain queries the indexer depends on.
///
/// Object-safe; components share one gateway as `Arc<dyn LogGateway>`.
/// Implementations retry transient failures themselves, so an `Err` here is
/// final for the call.
#[async_trait]
pub trait LogGateway: Send + Sync {
    /// Latest block number (`eth_blockNumber`).
    async fn block_height(&self) -> Result<u64, TransportError>;

    /// Logs in `[from, to]` matching `filter` (`eth_getLogs`).
    async fn logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError>;

    /// Header of block `number`, or `None` if the node does not know it.
    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, TransportError>;

    /// Contract bytecode at `address` as of `block`; empty if none.
    async fn code_at(&self, address: &str, block: u64) -> Result<Vec<u8>, TransportError>;

    /// Receipt of `tx_hash`, or `None` if unknown.
    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, TransportError>;

    /// Read-only contract call (`eth_call`) at `block`, or at `latest` if `None`.
    async fn call(&self, to: &str, data: &[u8], block: Option<u64>) -> Result<Vec<u8>, TransportError>;
}

/// Configuration for [`RpcGateway`].
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimiterConfig,
}

/// [`LogGateway`] over any [`RpcTransport`], adding rate limiting and retries.
pub struct RpcGateway<T> {
    transport: T,
    retry: RetryPolicy,
    limiter: RateLimiter,
    next_id: AtomicU64,
}

impl<T: RpcTransport> RpcGateway<T> {
    pub fn new(transport: T, config: GatewayConfig) -> Self {
        Self {
            transport,
            retry: RetryPolicy::new(config.retry),
            limiter: RateLimiter::new(config.rate_limit),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `method` until it succeeds, fails permanently, or the retry
    /// policy gives up.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire(method).await;

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let req = JsonRpcRequest::new(id, method, params.clone());
            let outcome = match self.transport.send(req).await {
                Ok(resp) => resp.into_result().map_err(TransportError::Rpc),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.transport.url(),
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            method,
                            attempt,
                            error = %e,
                            url = %self.transport.url(),
                            "max attempts exceeded"
                        );
                        return Err(TransportError::RetriesExhausted {
                            method: method.to_string(),
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_str(&self, method: &str, params: Vec<Value>) -> Result<String, TransportError> {
        let value = self.request(method, params).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::InvalidResponse(format!("{method}: expected hex string, got {value}")))
    }
}

#[async_trait]
impl<T: RpcTransport> LogGateway for RpcGateway<T> {
    async fn block_height(&self) -> Result<u64, TransportError> {
        let hex = self.request_str("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
    }

    async fn logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        let value = self.request("eth_getLogs", vec![filter.to_params(from, to)]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn block_header(&self, number: u64) -> Result<Option<BlockHeader>, TransportError> {
        let value = self
            .request("eth_getBlockByNumber", vec![json!(to_hex_quantity(number)), json!(false)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        BlockHeader::from_json(&value).map(Some)
    }

    async fn code_at(&self, address: &str, block: u64) -> Result<Vec<u8>, TransportError> {
        let hex = self
            .request_str("eth_getCode", vec![json!(address), json!(to_hex_quantity(block))])
            .await?;
        decode_hex_bytes(&hex)
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, TransportError> {
        let value = self.request("eth_getTransactionReceipt", vec![json!(tx_hash)]).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn call(&self, to: &str, data: &[u8], block: Option<u64>) -> Result<Vec<u8>, TransportError> {
        let tag = block.map_or_else(|| "latest".to_string(), to_hex_quantity);
        let tx = json!({ "to": to, "data": format!("0x{}", hex::encode(data)) });
        let hex = self.request_str("eth_call", vec![tx, json!(tag)]).await?;
        decode_hex_bytes(&hex)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::request::{JsonRpcError, JsonRpcResponse};

    /// Replays canned outcomes in order and records every request.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Value, TransportError>>>,
        seen: Mutex<Vec<JsonRpcRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Value, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            let id = req.id;
            self.seen.lock().unwrap().push(req);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Http("script exhausted".into())));
            next.map(|v| JsonRpcResponse::success(id, v))
        }

        fn url(&self) -> &str {
            "scripted://"
        }
    }

    fn rpc_error(code: i64) -> JsonRpcResponse {
        JsonRpcResponse::failure(
            1,
            JsonRpcError {
                code,
                message: "node says no".into(),
                data: None,
            },
        )
    }

    fn gateway(script: Vec<Result<Value, TransportError>>, attempts: u32) -> RpcGateway<ScriptedTransport> {
        RpcGateway::new(
            ScriptedTransport::new(script),
            GatewayConfig {
                retry: RetryConfig::immediate(attempts),
                rate_limit: RateLimiterConfig::unlimited(),
            },
        )
    }

    #[tokio::test]
    async fn block_height_parses_hex() {
        let gw = gateway(vec![Ok(json!("0x1f4"))], 3);
        assert_eq!(gw.block_height().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let gw = gateway(
            vec![
                Err(TransportError::Http("connection reset".into())),
                Err(TransportError::Timeout { ms: 30_000 }),
                Ok(json!("0x10")),
            ],
            3,
        );
        assert_eq!(gw.block_height().await.unwrap(), 16);
        assert_eq!(gw.transport().calls(), 3);
    }

    #[tokio::test]
    async fn retries_exhausted_after_max_attempts() {
        let gw = gateway(
            vec![
                Err(TransportError::Http("down".into())),
                Err(TransportError::Http("down".into())),
                Err(TransportError::Http("down".into())),
                Ok(json!("0x10")),
            ],
            3,
        );
        let err = gw.block_height().await.unwrap_err();
        match err {
            TransportError::RetriesExhausted { method, attempts, .. } => {
                assert_eq!(method, "eth_blockNumber");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gw.transport().calls(), 3);
    }

    #[tokio::test]
    async fn invalid_params_is_not_retried() {
        struct Rejecting;
        #[async_trait]
        impl RpcTransport for Rejecting {
            async fn send(&self, _req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
                Ok(rpc_error(crate::error::INVALID_PARAMS))
            }
            fn url(&self) -> &str {
                "rejecting://"
            }
        }

        let gw = RpcGateway::new(
            Rejecting,
            GatewayConfig {
                retry: RetryConfig::immediate(5),
                rate_limit: RateLimiterConfig::unlimited(),
            },
        );
        let err = gw.logs(0, 10, &LogFilter::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rpc(ref e) if e.code == -32602));
    }

    #[tokio::test]
    async fn logs_sends_filter_and_decodes() {
        let gw = gateway(
            vec![Ok(json!([{
                "address": "0xtoken",
                "topics": ["0xsig"],
                "data": "0x",
                "blockNumber": "0x64",
                "transactionHash": "0xaa",
                "logIndex": "0x0"
            }]))],
            1,
        );
        let filter = LogFilter::new().address("0xtoken");
        let logs = gw.logs(100, 199, &filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number_u64().unwrap(), 100);

        let seen = gw.transport().seen.lock().unwrap();
        assert_eq!(seen[0].method, "eth_getLogs");
        assert_eq!(seen[0].params[0]["fromBlock"], "0x64");
        assert_eq!(seen[0].params[0]["toBlock"], "0xc7");
    }

    #[tokio::test]
    async fn null_results_map_to_none() {
        let gw = gateway(vec![Ok(Value::Null), Ok(Value::Null)], 1);
        assert!(gw.block_header(5).await.unwrap().is_none());
        assert!(gw.receipt("0xaa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn code_and_call_decode_bytes() {
        let gw = gateway(vec![Ok(json!("0x")), Ok(json!("0x6080")), Ok(json!("0x2a"))], 1);
        assert!(gw.code_at("0xc0de", 1).await.unwrap().is_empty());
        assert_eq!(gw.code_at("0xc0de", 2).await.unwrap(), vec![0x60, 0x80]);
        assert_eq!(gw.call("0xc0de", &[0x6c, 0x7d, 0x5d, 0x26], None).await.unwrap(), vec![0x2a]);

        let seen = gw.transport().seen.lock().unwrap();
        assert_eq!(seen[2].params[0]["data"], "0x6c7d5d26");
        assert_eq!(seen[2].params[1], "latest");
    }

    #[tokio::test]
    async fn non_string_result_is_invalid() {
        let gw = gateway(vec![Ok(json!(42))], 1);
        assert!(matches!(
            gw.block_height().await.unwrap_err(),
            TransportError::InvalidResponse(_)
        ));
    }
}
