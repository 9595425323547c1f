use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

/// Token bucket shared by every detail worker.
///
/// Refills continuously at `requests_per_min / 60` tokens per second up to
/// `burst` tokens. A limiter built with zero requests per minute never waits.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    requests_per_min: u64,
    capacity: f64,
    // (tokens, last refill)
    bucket: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(requests_per_min: u64) -> Self {
        Self::with_burst(requests_per_min, requests_per_min)
    }

    pub fn with_burst(requests_per_min: u64, burst: u64) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            inner: Arc::new(Inner {
                requests_per_min,
                capacity,
                bucket: Mutex::new((capacity, Instant::now())),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn requests_per_min(&self) -> u64 {
        self.inner.requests_per_min
    }

    /// Waits until one request may be sent.
    pub async fn acquire(&self) {
        if self.inner.requests_per_min == 0 {
            return;
        }
        let refill_rate = self.inner.requests_per_min as f64 / 60.0;

        loop {
            let mut guard = self.inner.bucket.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * refill_rate).min(self.inner.capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                return;
            }
            let wait = (1.0 - *tokens) / refill_rate;
            drop(guard);
            trace!(wait_secs = wait, "Rate limiter waiting for a token");
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }
}
