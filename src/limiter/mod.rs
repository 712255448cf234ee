//! In-memory, single-process token bucket limiter keyed by client.
//!
//! Approximate and best effort: there is no coordination between processes.
//! The bucket table is bounded by `max_keys` and stale buckets are swept after
//! five windows of inactivity.

mod bucket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use bucket::{TokenBucketState, current_time_millis};

/// Buckets idle for this many windows are evicted.
const STALE_WINDOWS: u64 = 5;

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub window: Duration,
    pub max_keys: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limiter key table is full")]
    TableFull { retry_after: u64, limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
    /// Only set when rejected
    pub retry_after: Option<u64>,
}

pub struct RateLimiter {
    name: &'static str,
    capacity: u32,
    window_ms: u64,
    max_keys: usize,
    buckets: Mutex<HashMap<String, TokenBucketState>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, settings: RateLimitSettings) -> Self {
        Self {
            name,
            capacity: settings.capacity.max(1),
            window_ms: (settings.window.as_millis() as u64).max(1),
            max_keys: settings.max_keys.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit(&self) -> u32 {
        self.capacity
    }

    fn window_secs(&self) -> u64 {
        self.window_ms.div_ceil(1000).max(1)
    }

    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, LimiterError> {
        self.check_at(key, current_time_millis()).await
    }

    /// Admission check at an explicit time in Unix milliseconds.
    pub async fn check_at(&self, key: &str, now_ms: u64) -> Result<RateLimitDecision, LimiterError> {
        let (capacity, window_ms) = (self.capacity, self.window_ms);
        let mut buckets = self.buckets.lock().await;

        if !buckets.contains_key(key) && buckets.len() >= self.max_keys {
            // 满了先尝试清理过期桶
            let removed = self.sweep_locked(&mut buckets, now_ms);
            if buckets.len() >= self.max_keys {
                warn!(
                    limiter = self.name,
                    keys = buckets.len(),
                    removed,
                    "Rate limiter key table full, rejecting new key"
                );
                return Err(LimiterError::TableFull {
                    retry_after: self.window_secs(),
                    limit: self.capacity,
                });
            }
        }

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucketState::new(self.capacity, now_ms));
        bucket.refill(capacity, window_ms, now_ms);

        if bucket.try_take() {
            let decision = RateLimitDecision {
                allowed: true,
                limit: self.capacity,
                remaining: bucket.remaining(),
                reset_after_secs: bucket.reset_after_secs(capacity, window_ms),
                retry_after: None,
            };
            debug!(
                limiter = self.name,
                key = %key,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
            Ok(decision)
        } else {
            let retry_after = bucket.retry_after_secs(capacity, window_ms);
            debug!(
                limiter = self.name,
                key = %key,
                retry_after,
                "Rate limit exceeded"
            );
            Ok(RateLimitDecision {
                allowed: false,
                limit: self.capacity,
                remaining: 0,
                reset_after_secs: bucket.reset_after_secs(capacity, window_ms),
                retry_after: Some(retry_after),
            })
        }
    }

    /// Remove buckets idle for more than five windows. Returns how many were dropped.
    pub async fn sweep_at(&self, now_ms: u64) -> usize {
        let mut buckets = self.buckets.lock().await;
        self.sweep_locked(&mut buckets, now_ms)
    }

    fn sweep_locked(&self, buckets: &mut HashMap<String, TokenBucketState>, now_ms: u64) -> usize {
        let ttl = self.window_ms.saturating_mul(STALE_WINDOWS);
        let before = buckets.len();
        buckets.retain(|_, bucket| now_ms.saturating_sub(bucket.last_refill) <= ttl);
        before - buckets.len()
    }

    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.buckets.lock().await.is_empty()
    }

    /// Periodic sweep, once per window.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(limiter.window_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = limiter.sweep_at(current_time_millis()).await;
                if removed > 0 {
                    info!(limiter = limiter.name, removed, "Swept stale rate limit buckets");
                }
            }
        })
    }
}
