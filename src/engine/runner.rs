//! Run orchestrator: crawl every configured search, then evaluate whatever
//! is pending.
//!
//! Searches run one after another. A search that fails is logged and the
//! run moves on to the next one; its checkpoint keeps the progress made.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{normalize_isbn, DedupIndex};
use crate::config::AppConfig;
use crate::engine::evaluator::{EvaluationSummary, Evaluator};
use crate::engine::pending::PendingQueue;
use crate::engine::report::{RunReport, SearchStatus};
use crate::engine::scanner::ListingScraper;
use crate::marketplace::ListingSource;
use crate::storage::{CatalogStore, CheckpointStore};
use crate::types::{ScoutError, Search};
use crate::valuation::rate_limiter::TokenBucket;
use crate::valuation::ValuationSource;

pub struct Runner<'a, S> {
    store: &'a S,
    listings: &'a dyn ListingSource,
    valuation: &'a dyn ValuationSource,
    config: &'a AppConfig,
}

impl<'a, S> Runner<'a, S>
where
    S: CatalogStore + CheckpointStore,
{
    pub fn new(
        store: &'a S,
        listings: &'a dyn ListingSource,
        valuation: &'a dyn ValuationSource,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            store,
            listings,
            valuation,
            config,
        }
    }

    /// One full run: crawl, then evaluate.
    pub async fn run(&self, run_id: Uuid) -> Result<RunReport> {
        let mut report = RunReport::new(run_id);

        self.scrape_all(&mut report).await?;
        report.evaluation = self.evaluate_pending().await?;

        report.finish();
        Ok(report)
    }

    /// Crawl every configured search, resuming from its checkpoint.
    pub async fn scrape_all(&self, report: &mut RunReport) -> Result<()> {
        let mut dedup = DedupIndex::load(self.store).await?;
        let scraper = ListingScraper::new(self.listings, self.config.marketplace.page_size);

        for search in &self.config.searches {
            let search_key = search.search_key();
            let status = self.scrape_one(&scraper, search, &search_key, &mut dedup).await;
            report.push(&search.seller, &search_key, status);
        }
        Ok(())
    }

    async fn scrape_one(
        &self,
        scraper: &ListingScraper<'_>,
        search: &Search,
        search_key: &str,
        dedup: &mut DedupIndex,
    ) -> SearchStatus {
        let start_offset = match self.store.load_checkpoint(&search.seller, search_key).await {
            Ok(cp) => cp.map(|c| c.last_offset).unwrap_or(0),
            Err(e) => {
                error!(seller = %search.seller, search = %search_key, error = %e, "Failed to read checkpoint, skipping search");
                return SearchStatus::Skipped(format!("{e:#}"));
            }
        };

        match scraper
            .crawl(search, start_offset, dedup, self.store, self.store)
            .await
        {
            Ok(scrape) => {
                if scrape.completed {
                    // Next run starts the search over to pick up new stock.
                    if let Err(e) = self.store.save_checkpoint(&search.seller, search_key, 0).await {
                        warn!(seller = %search.seller, search = %search_key, error = %e, "Failed to reset checkpoint");
                    }
                }
                SearchStatus::Crawled(scrape)
            }
            Err(e) => {
                error!(seller = %search.seller, search = %search_key, error = %e, "Crawl failed, continuing with next search");
                SearchStatus::Failed(format!("{e:#}"))
            }
        }
    }

    /// Evaluate all pending entries (optionally one seller's).
    pub async fn evaluate_pending(&self) -> Result<EvaluationSummary> {
        let run = &self.config.run;
        let mut queue = PendingQueue::new(
            self.store,
            run.pending_seller.clone(),
            self.config.storage.pending_page_size,
        );
        let mut evaluator = Evaluator::new(
            self.valuation,
            TokenBucket::from_config(&self.config.valuation),
            &self.config.evaluation,
            Duration::from_millis(run.lookup_delay_ms),
        );

        info!(
            source = self.valuation.name(),
            seller = ?run.pending_seller,
            "Evaluating pending entries"
        );
        evaluator.run(&mut queue).await
    }
}

/// Mark the entry for `raw_isbn` as bought. Returns the normalised key.
pub async fn mark_bought(store: &dyn CatalogStore, raw_isbn: &str) -> Result<String> {
    let key = normalize_isbn(raw_isbn)
        .ok_or_else(|| ScoutError::Config(format!("not a valid ISBN: {raw_isbn}")))?;
    let updated = store
        .mark_bought(&key, Utc::now())
        .await
        .with_context(|| format!("Failed to mark {key} as bought"))?;
    if !updated {
        return Err(ScoutError::EntryNotFound(key).into());
    }
    info!(catalog_key = %key, "Marked as bought");
    Ok(key)
}
