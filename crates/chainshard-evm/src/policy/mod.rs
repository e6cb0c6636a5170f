//! Reliability policies applied around every log query.
//!
//! ```text
//! fetch(window) → [RateLimiter] → [Transport] ─ transient error ─▶ [RetryPolicy] ─▶ retry
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::RetryPolicy;
