//! Reads the migration deadline from the contract, if it exposes one.
//!
//! Contracts name the getter differently, so several common signatures are
//! tried in order. A value is accepted only if it looks like a UNIX
//! timestamp: non-zero and below 2^32.

use std::sync::Arc;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use migtrack_rpc::{LogGateway, TransportError};

use crate::abi::selector;

/// Getter signatures probed, in order.
pub const DEADLINE_GETTERS: [&str; 3] = ["deadline()", "endTime()", "migrationEnd()"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deadline {
    /// The getter that answered.
    pub getter: String,
    pub timestamp: i64,
    pub at: DateTime<Utc>,
}

impl Deadline {
    /// Seconds left until the deadline (negative once passed).
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.timestamp - now.timestamp()
    }
}

pub struct DeadlineProbe {
    gateway: Arc<dyn LogGateway>,
}

impl DeadlineProbe {
    pub fn new(gateway: Arc<dyn LogGateway>) -> Self {
        Self { gateway }
    }

    /// Try each getter on `contract` and return the first plausible deadline.
    ///
    /// Reverts and malformed answers move on to the next getter; a transport
    /// failure that survived the gateway's retries is returned.
    pub async fn probe(&self, contract: &str) -> Result<Option<Deadline>, TransportError> {
        for getter in DEADLINE_GETTERS {
            let data = selector(getter);
            let result = match self.gateway.call(contract, &data, None).await {
                Ok(bytes) => bytes,
                Err(e @ TransportError::RetriesExhausted { .. }) => return Err(e),
                Err(e) => {
                    debug!(getter, error = %e, "deadline getter not available");
                    continue;
                }
            };
            if let Some(deadline) = parse_deadline(getter, &result) {
                return Ok(Some(deadline));
            }
            debug!(getter, len = result.len(), "deadline getter returned an implausible value");
        }
        Ok(None)
    }
}

fn parse_deadline(getter: &str, result: &[u8]) -> Option<Deadline> {
    let word = result.get(..32)?;
    let value = U256::from_be_slice(word);
    if value.is_zero() || value >= U256::from(1u64 << 32) {
        return None;
    }
    let timestamp = value.to::<u64>() as i64;
    Some(Deadline {
        getter: getter.to_string(),
        timestamp,
        at: DateTime::from_timestamp(timestamp, 0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;

    const CONTRACT: &str = "0x99fe40e501151e92f10ac13ea1c06083ee170363";

    fn word(v: u64) -> Vec<u8> {
        U256::from(v).to_be_bytes::<32>().to_vec()
    }

    #[tokio::test]
    async fn falls_through_to_first_plausible_getter() {
        let chain = Arc::new(MockChain::new(1));
        // deadline() reverts, endTime() answers 0, migrationEnd() answers a timestamp
        chain.set_call_result(selector("endTime()"), word(0));
        chain.set_call_result(selector("migrationEnd()"), word(1_735_689_600));

        let deadline = DeadlineProbe::new(chain).probe(CONTRACT).await.unwrap().unwrap();
        assert_eq!(deadline.getter, "migrationEnd()");
        assert_eq!(deadline.timestamp, 1_735_689_600);
        assert_eq!(deadline.at.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn no_getter_means_none() {
        let chain = Arc::new(MockChain::new(1));
        chain.set_call_result(selector("deadline()"), word(1u64 << 40));
        assert!(DeadlineProbe::new(chain).probe(CONTRACT).await.unwrap().is_none());
    }

    #[test]
    fn remaining_time() {
        let d = parse_deadline("deadline()", &word(1_000)).unwrap();
        let now = DateTime::from_timestamp(400, 0).unwrap();
        assert_eq!(d.remaining_secs(now), 600);
        assert!(parse_deadline("deadline()", &[0u8; 4]).is_none());
    }
}
