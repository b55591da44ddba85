//! migtrack-rpc: the remote log gateway.
//!
//! The only part of migtrack that talks to the network. A [`RpcTransport`]
//! performs single JSON-RPC exchanges (HTTP via [`HttpRpcClient`]);
//! [`RpcGateway`] adds the token-bucket rate limiter and the retry policy and
//! exposes typed chain queries through the [`LogGateway`] trait.

pub mod client;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod request;
pub mod transport;
pub mod types;

pub use client::HttpRpcClient;
pub use error::TransportError;
pub use gateway::{GatewayConfig, LogGateway, RpcGateway};
pub use policy::{RateLimiterConfig, RetryConfig};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use transport::RpcTransport;
pub use types::{BlockHeader, LogFilter, RawLog, ReceiptLog, TopicFilter, TxReceipt};
