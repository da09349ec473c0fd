//! Token bucket rate limiter for upstream API throttling.
//!
//! Used by HTTP adapters to stay under a provider's published request quota
//! instead of reacting to 429 responses.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
///
/// Holds up to one second's worth of requests and refills continuously at
/// `requests_per_minute / 60` tokens per second.
#[derive(Debug)]
pub struct RateLimiter {
    /// Name for logging
    name: String,
    /// Maximum tokens in the bucket
    capacity: u32,
    /// Tokens added per second
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a new rate limiter allowing `requests_per_minute`.
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let capacity = ((requests_per_minute as f64 / 60.0).ceil() as u32).max(1);

        Self {
            name: name.into(),
            capacity,
            refill_per_sec: requests_per_minute as f64 / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire a token, waiting until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }

                let missing = 1.0 - bucket.tokens;
                Duration::from_secs_f64(missing / self.refill_per_sec)
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for token"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(5))).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity as f64);
        bucket.last_refill = now;
    }

    /// Get the configured capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

// ============================================================================
// Tests
// ============================================================================
