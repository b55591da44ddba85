//! Deployment-block locator.
//!
//! Binary search for the first block at which an address has contract code.
//! Requires code presence to be monotonic in block number (once deployed,
//! never removed). A self-destructed contract breaks that assumption.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use migtrack_rpc::{LogGateway, TransportError};

pub struct DeploymentLocator {
    gateway: Arc<dyn LogGateway>,
    probes: AtomicU64,
}

impl DeploymentLocator {
    pub fn new(gateway: Arc<dyn LogGateway>) -> Self {
        Self {
            gateway,
            probes: AtomicU64::new(0),
        }
    }

    /// `eth_getCode` probes issued by the last [`locate`](Self::locate).
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// First block in `[0, height]` with code at `address`.
    ///
    /// `Ok(None)` means the code never appears; `Ok(Some(0))` means it was
    /// there from genesis. A probe that fails after the gateway's retries
    /// aborts the search.
    pub async fn locate(&self, address: &str) -> Result<Option<u64>, TransportError> {
        let height = self.gateway.block_height().await?;
        self.locate_below(address, height).await
    }

    /// Like [`locate`](Self::locate) with an explicit upper bound.
    pub async fn locate_below(&self, address: &str, height: u64) -> Result<Option<u64>, TransportError> {
        self.probes.store(0, Ordering::Relaxed);
        let (mut lo, mut hi) = (0u64, height);
        let mut found = None;

        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            self.probes.fetch_add(1, Ordering::Relaxed);
            let code = self.gateway.code_at(address, mid).await?;
            debug!(address, block = mid, has_code = !code.is_empty(), "code probe");

            if code.is_empty() {
                match mid.checked_add(1) {
                    Some(next) => lo = next,
                    None => break,
                }
            } else {
                found = Some(mid);
                match mid.checked_sub(1) {
                    Some(prev) => hi = prev,
                    None => break,
                }
            }
        }

        info!(address, block = ?found, probes = self.probes(), "deployment search finished");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;

    const CONTRACT: &str = "0x99fe40e501151e92f10ac13ea1c06083ee170363";

    fn ceil_log2(n: u64) -> u64 {
        64 - (n.saturating_sub(1)).leading_zeros() as u64
    }

    #[tokio::test]
    async fn finds_deployment_in_log_probes() {
        let chain = Arc::new(MockChain::new(1_000));
        chain.deploy(CONTRACT, 500);
        let locator = DeploymentLocator::new(chain.clone());

        assert_eq!(locator.locate(CONTRACT).await.unwrap(), Some(500));
        assert!(locator.probes() <= ceil_log2(1_001) + 1, "probes = {}", locator.probes());
        assert_eq!(chain.code_probes(), locator.probes());
    }

    #[tokio::test]
    async fn never_deployed_is_none() {
        let chain = Arc::new(MockChain::new(1_000));
        let locator = DeploymentLocator::new(chain);
        assert_eq!(locator.locate(CONTRACT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn genesis_deployment_is_some_zero() {
        let chain = Arc::new(MockChain::new(64));
        chain.deploy(CONTRACT, 0);
        let locator = DeploymentLocator::new(chain);
        assert_eq!(locator.locate(CONTRACT).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn deployment_at_head() {
        let chain = Arc::new(MockChain::new(1_000));
        chain.deploy(CONTRACT, 1_000);
        let locator = DeploymentLocator::new(chain);
        assert_eq!(locator.locate(CONTRACT).await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn every_deployment_block_is_found() {
        let chain = Arc::new(MockChain::new(37));
        let locator = DeploymentLocator::new(chain.clone());
        for at in 0..=37 {
            chain.deploy(CONTRACT, at);
            assert_eq!(locator.locate(CONTRACT).await.unwrap(), Some(at));
        }
    }
}
