//! Token bucket for the valuation API.
//!
//! The bucket starts full and gains `refill_amount` tokens at every
//! `refill_interval` boundary, never exceeding `capacity`. Intervals missed
//! while nobody was asking are credited in one go on the next call.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ValuationConfig;

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    tokens: u32,
    refill_amount: u32,
    refill_interval: Duration,
    next_refill: Instant,
    waits: u64,
}

impl TokenBucket {
    /// Zero capacity, refill amount or interval are raised to the smallest
    /// usable value so `acquire` can always make progress.
    pub fn new(capacity: u32, refill_amount: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        let refill_interval = refill_interval.max(Duration::from_millis(1));
        Self {
            capacity,
            tokens: capacity,
            refill_amount: refill_amount.max(1),
            refill_interval,
            next_refill: Instant::now() + refill_interval,
            waits: 0,
        }
    }

    /// Bucket matching the configured per-minute allowance.
    pub fn from_config(cfg: &ValuationConfig) -> Self {
        Self::new(cfg.bucket_capacity, cfg.tokens_per_minute, Duration::from_secs(60))
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            self.waits += 1;
            let wait = self.next_refill.saturating_duration_since(Instant::now());
            debug!(wait_ms = wait.as_millis() as u64, "Valuation token bucket empty, waiting for refill");
            tokio::time::sleep_until(self.next_refill).await;
        }
    }

    /// Consume a token if one is available right now.
    pub fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (after applying any due refill).
    pub fn available(&mut self) -> u32 {
        self.refill(Instant::now());
        self.tokens
    }

    /// How many times `acquire` had to wait.
    pub fn waits(&self) -> u64 {
        self.waits
    }

    fn refill(&mut self, now: Instant) {
        if now < self.next_refill {
            return;
        }
        let overdue = now.duration_since(self.next_refill);
        let periods = 1 + overdue.as_nanos() / self.refill_interval.as_nanos();
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);

        self.tokens = self
            .tokens
            .saturating_add(periods.saturating_mul(self.refill_amount))
            .min(self.capacity);
        self.next_refill += self.refill_interval.saturating_mul(periods);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
