//! Client-side request budget for one RPC endpoint.
//!
//! A token bucket: `refill_rate` tokens per second up to `capacity`, one token
//! per request. All workers of a job share the limiter through their common
//! `HttpLogSource`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Burst size.
    pub capacity: f64,
    /// Tokens per second.
    pub refill_rate: f64,
}

impl RateLimiterConfig {
    /// Steady `rps` requests per second with a burst of one second's worth.
    pub fn per_second(rps: f64) -> Self {
        Self {
            capacity: rps.max(1.0),
            refill_rate: rps,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Token bucket shared by concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                updated: Instant::now(),
            }),
            config,
        }
    }

    /// Take a token now, or return how long until one is due.
    ///
    /// Refill and take happen under one lock, so two callers never both see
    /// the last token.
    pub fn take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        bucket.updated = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        if self.config.refill_rate <= 0.0 {
            // never refills; poll slowly rather than spin
            return Err(Duration::from_secs(1));
        }
        Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.config.refill_rate))
    }

    /// Wait for a token and take it.
    pub async fn acquire(&self) {
        while let Err(wait) = self.take() {
            let wait = wait.max(Duration::from_millis(1));
            tracing::trace!(wait_ms = wait.as_millis() as u64, "request budget exhausted");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_wait() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            capacity: 3.0,
            refill_rate: 0.001,
        });
        for _ in 0..3 {
            assert_eq!(limiter.take(), Ok(()));
        }
        let wait = limiter.take().unwrap_err();
        assert!(wait > Duration::from_secs(100), "{wait:?}");
    }

    #[test]
    fn per_second_wait_is_short() {
        let limiter = RateLimiter::new(RateLimiterConfig::per_second(10.0));
        while limiter.take().is_ok() {}
        let wait = limiter.take().unwrap_err();
        assert!(wait <= Duration::from_millis(150), "{wait:?}");
    }

    #[test]
    fn fractional_rate_keeps_one_token_burst() {
        let cfg = RateLimiterConfig::per_second(0.5);
        assert_eq!(cfg.capacity, 1.0);
        let limiter = RateLimiter::new(cfg);
        assert!(limiter.take().is_ok());
        assert!(limiter.take().is_err());
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            capacity: 1.0,
            refill_rate: 100.0,
        });
        limiter.acquire().await;
        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
