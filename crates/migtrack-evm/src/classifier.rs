//! Best-effort tagging of where a migration came from.
//!
//! The tag is a heuristic. Nothing in the decoder or the store depends on it
//! being right, and every failure degrades to `SourceChain::Unknown`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use migtrack_core::types::SourceChain;
use migtrack_rpc::LogGateway;

/// Decides the source tag of the transaction that emitted an event.
#[async_trait]
pub trait SourceClassifier: Send + Sync {
    /// Never fails: anything that goes wrong yields `Unknown`.
    async fn classify(&self, tx_hash: &str) -> SourceChain;
}

/// Always answers with the same tag. `StaticClassifier::default()` tags
/// everything `Unknown`, which is how classification is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticClassifier(pub SourceChain);

#[async_trait]
impl SourceClassifier for StaticClassifier {
    async fn classify(&self, _tx_hash: &str) -> SourceChain {
        self.0
    }
}

/// Inspects the transaction receipt for bridge events.
///
/// - receipt missing or lookup failed → `Unknown`
/// - any receipt log whose `topics[0]` is a bridge signature → `Ethereum`
/// - otherwise → `Sonic`
pub struct ReceiptClassifier {
    gateway: Arc<dyn LogGateway>,
    bridge_signatures: HashSet<String>,
}

impl ReceiptClassifier {
    pub fn new<I, S>(gateway: Arc<dyn LogGateway>, bridge_signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            gateway,
            bridge_signatures: bridge_signatures
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl SourceClassifier for ReceiptClassifier {
    async fn classify(&self, tx_hash: &str) -> SourceChain {
        let receipt = match self.gateway.receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                debug!(tx = tx_hash, "no receipt, source unknown");
                return SourceChain::Unknown;
            }
            Err(e) => {
                debug!(tx = tx_hash, error = %e, "receipt lookup failed, source unknown");
                return SourceChain::Unknown;
            }
        };

        let bridged = receipt
            .event_signatures()
            .any(|sig| self.bridge_signatures.contains(&sig.to_lowercase()));
        if bridged {
            SourceChain::Ethereum
        } else {
            SourceChain::Sonic
        }
    }
}
