//! Token bucket arithmetic for a single key.
//!
//! Buckets are refilled lazily on access: no background tick is needed for
//! correctness, the elapsed time since the last refill is converted to tokens
//! whenever the bucket is looked at.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketState {
    /// Always within `0..=capacity`
    pub tokens: f64,
    /// Unix timestamp in milliseconds
    pub last_refill: u64,
}

impl TokenBucketState {
    /// A new bucket starts full.
    pub fn new(capacity: u32, now_ms: u64) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now_ms,
        }
    }

    /// Adds `elapsed * capacity / window` tokens, clamped at `capacity`.
    pub fn refill(&mut self, capacity: u32, window_ms: u64, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill);
        let added = elapsed_ms as f64 * capacity as f64 / window_ms as f64;
        self.tokens = (self.tokens + added).min(capacity as f64);
        self.last_refill = self.last_refill.max(now_ms);
    }

    /// Spend one token if available.
    pub fn try_take(&mut self) -> bool {
        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.tokens.max(0.0).floor() as u32
    }

    /// Seconds until one whole token is available, at least 1.
    pub fn retry_after_secs(&self, capacity: u32, window_ms: u64) -> u64 {
        let missing = (1.0 - self.tokens).max(0.0);
        (ms_to_refill(missing, capacity, window_ms) / 1000.0).ceil().max(1.0) as u64
    }

    /// Seconds until the bucket is full again.
    pub fn reset_after_secs(&self, capacity: u32, window_ms: u64) -> u64 {
        let missing = (capacity as f64 - self.tokens).max(0.0);
        (ms_to_refill(missing, capacity, window_ms) / 1000.0).ceil() as u64
    }
}

// missing / (capacity / window), kept in this order so whole-token waits stay exact
fn ms_to_refill(missing: f64, capacity: u32, window_ms: u64) -> f64 {
    missing * window_ms as f64 / capacity as f64
}

pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: u64 = 60_000;

    #[test]
    fn refill_is_clamped_at_capacity() {
        let mut bucket = TokenBucketState::new(60, 0);
        bucket.tokens = 10.0;
        bucket.refill(60, MINUTE, 10 * 60_000);
        assert_eq!(bucket.tokens, 60.0);
        assert_eq!(bucket.last_refill, 600_000);
    }

    #[test]
    fn partial_refill_accumulates_fractions() {
        let mut bucket = TokenBucketState::new(60, 0);
        bucket.tokens = 0.0;
        bucket.refill(60, MINUTE, 500);
        assert!((bucket.tokens - 0.5).abs() < 1e-9);
        assert!(!bucket.try_take());
        bucket.refill(60, MINUTE, 1000);
        assert!(bucket.try_take());
    }

    #[test]
    fn clock_going_backwards_adds_nothing() {
        let mut bucket = TokenBucketState::new(5, 1_000);
        bucket.tokens = 2.0;
        bucket.refill(5, MINUTE, 500);
        assert_eq!(bucket.tokens, 2.0);
        assert_eq!(bucket.last_refill, 1_000);
    }

    #[test]
    fn retry_after_rounds_up() {
        let mut bucket = TokenBucketState::new(20, 0);
        bucket.tokens = 0.0;
        // 20 per minute: one token every 3 seconds
        assert_eq!(bucket.retry_after_secs(20, MINUTE), 3);
        bucket.tokens = 0.9;
        assert_eq!(bucket.retry_after_secs(20, MINUTE), 1);
    }

    #[test]
    fn reset_counts_time_to_full() {
        let mut bucket = TokenBucketState::new(60, 0);
        assert_eq!(bucket.reset_after_secs(60, MINUTE), 0);
        bucket.tokens = 0.0;
        assert_eq!(bucket.reset_after_secs(60, MINUTE), 60);
    }
}
