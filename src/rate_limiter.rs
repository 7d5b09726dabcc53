//! Download throttling using a token bucket
//!
//! The RateLimiter provides process-wide bandwidth limiting across all concurrent
//! artifact downloads. One instance is built by the service and shared by clone.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::DownloadConfig;

/// Shortest sleep taken while waiting for tokens
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Global rate limiter shared across all downloads
///
/// # Algorithm
///
/// - Tokens represent bytes that can be transferred
/// - Tokens refill at a constant rate, capped at the burst capacity
/// - Callers take what is available and sleep for exactly the missing
///   amount divided by the rate
///
/// Requests larger than the burst capacity are served in capacity-sized
/// portions, so they complete instead of waiting for a bucket that can never fill.
///
/// A missing or non-positive rate disables throttling entirely.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<Bucket>>,
}

struct Bucket {
    /// Refill rate in bytes per second
    rate: f64,
    /// Bucket capacity in bytes
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new RateLimiter
    ///
    /// # Arguments
    ///
    /// * `rate_bps` - Bytes per second (None, zero or negative = unlimited)
    /// * `burst` - Bucket capacity in bytes (None or non-positive = same as the rate)
    ///
    /// The bucket starts full.
    #[must_use]
    pub fn new(rate_bps: Option<i64>, burst: Option<i64>) -> Self {
        let inner = rate_bps.filter(|r| *r > 0).map(|rate| {
            let capacity = burst.filter(|b| *b > 0).unwrap_or(rate) as f64;
            Arc::new(Bucket {
                rate: rate as f64,
                capacity,
                state: Mutex::new(BucketState {
                    tokens: capacity,
                    last_refill: Instant::now(),
                }),
            })
        });

        Self { inner }
    }

    /// Build the limiter described by the download settings
    #[must_use]
    pub fn from_config(config: &DownloadConfig) -> Self {
        let to_i64 = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Self::new(
            config.rate_limit_bps.map(to_i64),
            config.burst_bytes.map(to_i64),
        )
    }

    /// Configured rate in bytes per second (None = unlimited)
    pub fn rate(&self) -> Option<u64> {
        self.inner.as_ref().map(|b| b.rate as u64)
    }

    /// Bucket capacity in bytes (None = unlimited)
    pub fn burst(&self) -> Option<u64> {
        self.inner.as_ref().map(|b| b.capacity as u64)
    }

    /// Wait until `bytes` may be transferred
    ///
    /// Returns immediately when throttling is disabled or `bytes` is zero.
    pub async fn wait_bytes(&self, bytes: u64) {
        let Some(bucket) = &self.inner else {
            return;
        };
        if bytes == 0 {
            return;
        }

        let mut remaining = bytes as f64;

        loop {
            let wait = {
                let mut state = bucket
                    .state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                bucket.refill(&mut state);

                let take = remaining.min(state.tokens);
                state.tokens -= take;
                remaining -= take;
                if remaining <= 0.0 {
                    return;
                }

                // Wait for the next portion only, never more than a full bucket
                let deficit = remaining.min(bucket.capacity) - state.tokens;
                Duration::from_secs_f64(deficit / bucket.rate)
            };

            tokio::time::sleep(wait.max(MIN_WAIT)).await;
        }
    }
}

impl Bucket {
    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate())
            .field("burst", &self.burst())
            .finish()
    }
}
