//! Evaluator loop: drain the pending queue, look each entry up with the
//! valuation service under the token bucket, evaluate, and persist.
//!
//! A failed or empty lookup never aborts the loop; the entry is stored as
//! REJECT with the failure as its reason. Only a failure to read the queue
//! itself is fatal.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::pending::PendingQueue;
use crate::strategy::{evaluate, EvaluationConfig};
use crate::types::{Decision, EvaluationResult};
use crate::valuation::rate_limiter::TokenBucket;
use crate::valuation::ValuationSource;

/// Totals for one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub evaluated: u64,
    pub buy: u64,
    pub review: u64,
    pub reject: u64,
    /// Lookups that returned no product.
    pub not_found: u64,
    /// Lookups that errored.
    pub lookup_failures: u64,
    /// Results that could not be written back.
    pub write_errors: u64,
    /// Times the token bucket made us wait.
    pub rate_limited_waits: u64,
}

impl EvaluationSummary {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Buy => self.buy += 1,
            Decision::Review => self.review += 1,
            Decision::Reject => self.reject += 1,
            Decision::Bought => {}
        }
    }
}

pub struct Evaluator<'a> {
    valuation: &'a dyn ValuationSource,
    limiter: TokenBucket,
    config: &'a EvaluationConfig,
    lookup_delay: Duration,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        valuation: &'a dyn ValuationSource,
        limiter: TokenBucket,
        config: &'a EvaluationConfig,
        lookup_delay: Duration,
    ) -> Self {
        Self {
            valuation,
            limiter,
            config,
            lookup_delay,
        }
    }

    /// Evaluate every entry the queue yields.
    pub async fn run(&mut self, queue: &mut PendingQueue<'_>) -> Result<EvaluationSummary> {
        let mut summary = EvaluationSummary::default();

        while let Some(entry) = queue.next().await? {
            let key = entry.catalog_key.as_str();

            self.limiter.acquire().await;
            let result = match self.valuation.lookup(key).await {
                Ok(Some(payload)) => evaluate(Some(&payload), entry.buy_price(), self.config),
                Ok(None) => {
                    summary.not_found += 1;
                    evaluate(None, entry.buy_price(), self.config)
                }
                Err(e) => {
                    summary.lookup_failures += 1;
                    warn!(catalog_key = key, error = %e, "Valuation lookup failed");
                    EvaluationResult::no_data(format!("valuation lookup failed: {e}"))
                }
            };

            if !self.lookup_delay.is_zero() {
                tokio::time::sleep(self.lookup_delay).await;
            }

            debug!(
                catalog_key = key,
                buy_price = format!("${:.2}", entry.buy_price()),
                result = %result,
                "Entry evaluated"
            );

            match queue.apply_evaluation(key, &result).await {
                Ok(true) => {
                    summary.evaluated += 1;
                    summary.record(result.decision);
                    if result.decision == Decision::Buy {
                        info!(catalog_key = key, title = %entry.title, result = %result, "BUY candidate");
                    }
                }
                Ok(false) => {
                    summary.write_errors += 1;
                    warn!(catalog_key = key, "Entry vanished before its evaluation was written");
                }
                Err(e) => {
                    summary.write_errors += 1;
                    warn!(catalog_key = key, error = %e, "Failed to write evaluation");
                }
            }
        }

        summary.rate_limited_waits = self.limiter.waits();
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
