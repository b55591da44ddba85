//! The `RpcTransport` trait: a single request/response exchange with a node.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// One-shot JSON-RPC transport.
///
/// Transports do not retry or rate-limit; [`RpcGateway`](crate::RpcGateway)
/// layers those policies on top. The trait is object-safe.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The transport's identifier (URL or name), used in logs and errors.
    fn url(&self) -> &str;
}
