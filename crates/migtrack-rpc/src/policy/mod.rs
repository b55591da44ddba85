//! Reliability policies applied by the gateway around every request.
//!
//! ```text
//! Request → [RateLimiter] → [Transport] → retryable error? → [RetryPolicy] → …
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig, TokenBucket};
pub use retry::{RetryConfig, RetryPolicy};
