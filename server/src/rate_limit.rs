//! Per-address throttling of login code requests.
//!
//! Each address gets a token bucket. Requesting a code spends one token;
//! tokens come back at a fixed rate up to the bucket's capacity. Together
//! with the attempt cap in [`crate::login_code`], this bounds how many
//! guesses can be made against one account per hour.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use eventdesk_server::rate_limit::RateLimiter;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = RateLimiter::new(2, Duration::from_secs(300));
//!
//!     assert!(limiter.check("ada@example.com").await.is_allowed());
//!     assert!(limiter.check("ada@example.com").await.is_allowed());
//!     assert!(limiter.check("ada@example.com").await.is_limited());
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Codes an address may request back to back.
pub const DEFAULT_CAPACITY: u32 = 3;

/// Time for one spent request to come back.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(300);

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,

    /// Rejected; the next token is `retry_after_secs` away.
    Limited { retry_after_secs: u64 },
}

impl RateLimitResult {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    #[inline]
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

/// Token bucket for a single address.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, rate: f64, capacity: u32) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(f64::from(capacity));
        self.last_refill = now;
    }

    fn try_consume(&mut self, rate: f64, capacity: u32) -> RateLimitResult {
        self.refill(rate, capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateLimitResult::Allowed;
        }

        let seconds_until_token = (1.0 - self.tokens) / rate;
        RateLimitResult::Limited {
            retry_after_secs: (seconds_until_token.ceil() as u64).max(1),
        }
    }
}

/// Thread-safe rate limiter keyed by normalized email address.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<RwLock<HashMap<String, TokenBucket>>>,
    capacity: u32,
    /// Tokens per second.
    rate: f64,
}

impl RateLimiter {
    /// A limiter allowing bursts of `capacity` and one more request every
    /// `refill_interval`.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            rate: 1.0 / refill_interval.as_secs_f64().max(f64::EPSILON),
        }
    }

    /// Spends one token for `key`.
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let mut buckets = self.inner.write().await;
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity));
        bucket.try_consume(self.rate, self.capacity)
    }

    /// Time after which an idle bucket is full again and can be forgotten.
    fn idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.capacity) / self.rate)
    }

    /// Drops buckets that have refilled completely. Returns how many.
    pub async fn cleanup_stale_entries(&self) -> usize {
        let timeout = self.idle_timeout();
        let mut buckets = self.inner.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.last_refill.elapsed() < timeout);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed_count = removed, "Cleaned up idle rate limit entries");
        }
        removed
    }

    pub async fn tracked_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_INTERVAL)
    }
}
