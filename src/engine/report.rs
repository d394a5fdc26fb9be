//! Run report: per-search crawl outcomes plus evaluation totals.
//!
//! Built up by the runner as it goes and logged once at the end of a run.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::evaluator::EvaluationSummary;
use crate::engine::scanner::ScrapeReport;

// ---------------------------------------------------------------------------
// Search outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SearchStatus {
    Crawled(ScrapeReport),
    /// The crawl stopped on an error; earlier pages are persisted.
    Failed(String),
    /// Never started (e.g. the checkpoint could not be read).
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub seller: String,
    pub search_key: String,
    pub status: SearchStatus,
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub searches: Vec<SearchOutcome>,
    pub evaluation: EvaluationSummary,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            searches: Vec::new(),
            evaluation: EvaluationSummary::default(),
        }
    }

    pub fn push(&mut self, seller: &str, search_key: &str, status: SearchStatus) {
        self.searches.push(SearchOutcome {
            seller: seller.to_string(),
            search_key: search_key.to_string(),
            status,
        });
    }

    fn crawled(&self) -> impl Iterator<Item = &ScrapeReport> {
        self.searches.iter().filter_map(|s| match &s.status {
            SearchStatus::Crawled(r) => Some(r),
            _ => None,
        })
    }

    pub fn total_inserted(&self) -> u64 {
        self.crawled().map(|r| r.inserted).sum()
    }

    pub fn total_scraped(&self) -> u64 {
        self.crawled().map(|r| r.scraped).sum()
    }

    pub fn failed_searches(&self) -> usize {
        self.searches
            .iter()
            .filter(|s| !matches!(s.status, SearchStatus::Crawled(_)))
            .count()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Log a human-readable run summary.
    pub fn log_summary(&self) {
        for outcome in &self.searches {
            match &outcome.status {
                SearchStatus::Crawled(_) => {}
                SearchStatus::Failed(e) | SearchStatus::Skipped(e) => warn!(
                    seller = %outcome.seller,
                    search = %outcome.search_key,
                    error = %e,
                    "Search did not complete"
                ),
            }
        }

        let elapsed_secs = self
            .finished_at
            .map(|f| (f - self.started_at).num_seconds())
            .unwrap_or_default();

        info!(
            run_id = %self.run_id,
            searches = self.searches.len(),
            failed_searches = self.failed_searches(),
            scraped = self.total_scraped(),
            inserted = self.total_inserted(),
            evaluated = self.evaluation.evaluated,
            buy = self.evaluation.buy,
            review = self.evaluation.review,
            reject = self.evaluation.reject,
            lookup_failures = self.evaluation.lookup_failures,
            write_errors = self.evaluation.write_errors,
            elapsed_secs,
            "Run complete"
        );
    }
}
