//! Token-bucket rate limiting.
//!
//! One limiter paces the connection-probe fan-out (replacing the random
//! pre-probe sleep of older designs), the others back the HTTP global and
//! per-path limits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket: `rate` tokens per second, holding at most `burst`.
#[derive(Clone)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    bucket: Arc<Mutex<Bucket>>,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            rate,
            burst,
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Take one token without waiting. Returns false when the bucket is dry.
    pub async fn try_acquire(&self) -> bool {
        let mut b = self.bucket.lock().await;
        self.refill(&mut b);
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut b = self.bucket.lock().await;
                self.refill(&mut b);
                if b.tokens >= 1.0 {
                    b.tokens -= 1.0;
                    return;
                }
                // Time until one token accrues.
                Duration::from_secs_f64((1.0 - b.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, b: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(b.last_refill).as_secs_f64();
        b.tokens = (b.tokens + elapsed * self.rate).min(self.burst);
        b.last_refill = now;
    }
}

/// The process-wide limiters.
#[derive(Clone)]
pub struct RateLimits {
    /// Whole HTTP surface.
    pub global: TokenBucket,
    /// Read-heavy MCI status/list paths.
    pub mci_read: TokenBucket,
    /// Connection probe fan-out towards the broker.
    pub probe: TokenBucket,
}

impl RateLimits {
    pub fn new() -> Self {
        Self {
            global: TokenBucket::new(20.0, 20.0),
            mci_read: TokenBucket::new(2.0, 2.0),
            probe: TokenBucket::new(10.0, 10.0),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}
