//! Token bucket rate limiter.
//!
//! Tokens accrue at `refill_rate` tokens/second up to `capacity`. Each request
//! consumes a method-dependent cost; `eth_getLogs` is charged more than point
//! lookups. `acquire` waits for tokens instead of failing.
//!
//! A single wait is capped at [`MAX_WAIT`]. A call never costs more than the
//! bucket can hold, and a non-positive refill rate disables limiting, so
//! `acquire` always returns.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Longest single wait reported by [`TokenBucket::try_acquire`].
pub const MAX_WAIT: Duration = Duration::from_secs(60);

fn default_capacity() -> f64 {
    50.0
}
fn default_refill_rate() -> f64 {
    25.0
}
fn default_logs_cost() -> f64 {
    5.0
}

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum tokens in the bucket.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Token refill rate (tokens per second).
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
    /// Cost of one `eth_getLogs` call; every other method costs 1.
    #[serde(default = "default_logs_cost")]
    pub logs_cost: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            logs_cost: default_logs_cost(),
        }
    }
}

impl RateLimiterConfig {
    /// A bucket that never runs dry.
    pub fn unlimited() -> Self {
        Self {
            capacity: f64::MAX,
            refill_rate: f64::MAX,
            logs_cost: 0.0,
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take `cost` tokens if available, otherwise report how long until they are.
    pub fn try_acquire(&self, cost: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            return Ok(());
        }
        let deficit = cost - state.tokens;
        if self.refill_rate <= 0.0 {
            return Err(MAX_WAIT);
        }
        let wait = Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(MAX_WAIT);
        Err(wait.min(MAX_WAIT))
    }

    /// Currently available tokens.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

/// Per-method rate limiter over a shared token bucket.
pub struct RateLimiter {
    bucket: TokenBucket,
    logs_cost: f64,
    capacity: f64,
}

impl RateLimiter {
    /// Build a limiter from `config`.
    ///
    /// Costs are clamped to the bucket capacity. A capacity or refill rate
    /// that is not positive yields an unlimited limiter.
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = if config.capacity > 0.0 && config.refill_rate > 0.0 {
            config
        } else {
            tracing::warn!(
                capacity = config.capacity,
                refill_rate = config.refill_rate,
                "rate limiter disabled: capacity and refill rate must be positive"
            );
            RateLimiterConfig::unlimited()
        };
        Self {
            bucket: TokenBucket::new(config.capacity, config.refill_rate),
            logs_cost: config.logs_cost.max(0.0).min(config.capacity),
            capacity: config.capacity,
        }
    }

    /// Token cost of one call to `method`.
    pub fn cost_of(&self, method: &str) -> f64 {
        if method == "eth_getLogs" {
            self.logs_cost
        } else {
            self.capacity.min(1.0)
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    pub fn try_acquire(&self, method: &str) -> Result<(), Duration> {
        self.bucket.try_acquire(self.cost_of(method))
    }

    /// Wait until the bucket can pay for one call to `method`.
    ///
    /// The lock is released before sleeping.
    pub async fn acquire(&self, method: &str) {
        let cost = self.cost_of(method);
        while let Err(wait) = self.bucket.try_acquire(cost) {
            tracing::debug!(method, wait_ms = wait.as_millis() as u64, "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn available(&self) -> f64 {
        self.bucket.available()
    }
}
