//! Per-key token-bucket admission control.
//!
//! Buckets are created full on first use and refill continuously at the
//! configured rate up to the burst capacity. A background sweep removes
//! buckets that have refilled to capacity, which bounds memory to the keys
//! active within one sweep interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Configuration for the rate limiter.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained rate (tokens per second per key).
    #[serde(default = "RateLimitConfig::default_rps")]
    pub requests_per_second: f64,
    /// Bucket capacity.
    #[serde(default = "RateLimitConfig::default_burst")]
    pub burst: u32,
    /// Interval between idle-bucket sweeps (seconds).
    #[serde(default = "RateLimitConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl RateLimitConfig {
    const fn default_rps() -> f64 {
        10.0
    }

    const fn default_burst() -> u32 {
        20
    }

    const fn default_sweep_interval() -> u64 {
        60
    }

    /// Get the sweep interval as a `Duration`, never zero.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: Self::default_rps(),
            burst: Self::default_burst(),
            sweep_interval_seconds: Self::default_sweep_interval(),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    level: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.level = (self.level + elapsed.as_secs_f64() * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token-bucket rate limiter keyed by caller.
///
/// Invariant: `0 <= level <= capacity` for every bucket.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Mutex<Bucket>>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    /// Create a limiter.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            rate: config.requests_per_second.max(0.0),
            capacity: f64::from(config.burst.max(1)),
        }
    }

    /// Try to take one token for `key`.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// [`RateLimiter::admit`] against an explicit clock.
    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(key) {
                return self.take(&mut bucket.lock(), now);
            }
        }

        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            Mutex::new(Bucket {
                level: self.capacity,
                last_refill: now,
            })
        });
        self.take(bucket.get_mut(), now)
    }

    fn take(&self, bucket: &mut Bucket, now: Instant) -> bool {
        bucket.refill(self.rate, self.capacity, now);
        if bucket.level >= 1.0 {
            bucket.level -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remove buckets that have refilled to capacity.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`RateLimiter::sweep`] against an explicit clock.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let bucket = bucket.get_mut();
            bucket.refill(self.rate, self.capacity, now);
            bucket.level < self.capacity
        });
        before - buckets.len()
    }

    /// Number of live buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    /// Returns `true` if no buckets are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep on a fixed interval until `shutdown` turns `true`.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Swept idle rate-limit buckets");
                    }
                }
            }
        }
    }
}
