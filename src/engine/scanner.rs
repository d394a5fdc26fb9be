//! Paginated listing scraper.
//!
//! Walks one seller search page by page from a resume offset, skips
//! listings already in the catalog, inserts the rest one at a time, and
//! checkpoints the next offset after every page. A crawl ends when the
//! marketplace returns a short page, when the per-run insert threshold is
//! reached, or when a page fetch fails.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::catalog::DedupIndex;
use crate::marketplace::{ListingSource, PageRequest};
use crate::storage::{CatalogStore, CheckpointStore, InsertOutcome};
use crate::types::Search;

// ---------------------------------------------------------------------------
// Scrape report
// ---------------------------------------------------------------------------

/// Counters for one crawl of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    pub pages: u64,
    /// Listings returned by the marketplace.
    pub scraped: u64,
    /// Raw items the source could not convert (no usable price).
    pub dropped: u64,
    /// Listings that carried a catalog key.
    pub with_catalog_key: u64,
    /// Skipped because the dedup index already had the key.
    pub already_known: u64,
    pub inserted: u64,
    /// Unique-key conflicts at insert time.
    pub duplicates: u64,
    /// Write failures other than duplicates.
    pub errors: u64,
    /// Offset the next crawl should resume from.
    pub next_offset: u64,
    /// The marketplace ran out of results.
    pub completed: bool,
    /// Stopped early on the insert threshold.
    pub paused: bool,
}

// ---------------------------------------------------------------------------
// Scraper
// ---------------------------------------------------------------------------

pub struct ListingScraper<'a> {
    source: &'a dyn ListingSource,
    page_size: u32,
}

impl<'a> ListingScraper<'a> {
    /// `page_size` is clamped to what the source honours, so a short page
    /// always means the end of results.
    pub fn new(source: &'a dyn ListingSource, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.clamp(1, source.max_page_size().max(1)),
        }
    }

    /// Crawl `search` starting at `start_offset`.
    ///
    /// The checkpoint is saved after every page, including the last one;
    /// resetting it on completion is the caller's call. A fetch error is
    /// returned as-is with the last saved checkpoint untouched.
    pub async fn crawl(
        &self,
        search: &Search,
        start_offset: u64,
        dedup: &mut DedupIndex,
        catalog: &dyn CatalogStore,
        checkpoints: &dyn CheckpointStore,
    ) -> Result<ScrapeReport> {
        let search_key = search.search_key();
        let mut report = ScrapeReport {
            next_offset: start_offset,
            ..Default::default()
        };

        info!(
            source = self.source.name(),
            seller = %search.seller,
            search = %search_key,
            start_offset,
            "Starting crawl"
        );

        loop {
            let request = PageRequest::for_search(search, report.next_offset, self.page_size);
            let page = self
                .source
                .fetch_page(&request)
                .await
                .with_context(|| {
                    format!("Failed to fetch page at offset {} for {search}", report.next_offset)
                })?;

            report.pages += 1;
            report.scraped += page.listings.len() as u64;
            report.dropped += page.dropped() as u64;
            let page_len = page.raw_len;

            for listing in &page.listings {
                let Some(key) = listing.catalog_key.as_deref() else {
                    continue;
                };
                report.with_catalog_key += 1;

                if dedup.contains(key) {
                    report.already_known += 1;
                    continue;
                }

                match catalog.insert_listing(listing).await {
                    Ok(InsertOutcome::Inserted) => {
                        report.inserted += 1;
                        dedup.insert(key);
                    }
                    Ok(InsertOutcome::Duplicate) => {
                        report.duplicates += 1;
                        dedup.insert(key);
                    }
                    Err(e) => {
                        report.errors += 1;
                        warn!(error = %e, catalog_key = key, item_id = %listing.item_id, "Failed to insert listing");
                    }
                }
            }

            report.next_offset += page_len as u64;
            if let Err(e) = checkpoints
                .save_checkpoint(&search.seller, &search_key, report.next_offset)
                .await
            {
                warn!(error = %e, offset = report.next_offset, "Failed to save checkpoint");
            }

            debug!(
                offset = report.next_offset,
                page_len,
                dropped = page.dropped(),
                inserted = report.inserted,
                "Page processed"
            );

            if page_len < self.page_size as usize {
                report.completed = true;
                break;
            }

            if let Some(limit) = search.pause_after_new {
                if report.inserted >= limit {
                    report.paused = true;
                    info!(inserted = report.inserted, limit, "Insert threshold reached, pausing crawl");
                    break;
                }
            }
        }

        info!(
            seller = %search.seller,
            search = %search_key,
            pages = report.pages,
            scraped = report.scraped,
            inserted = report.inserted,
            known = report.already_known,
            duplicates = report.duplicates,
            errors = report.errors,
            next_offset = report.next_offset,
            completed = report.completed,
            paused = report.paused,
            "Crawl finished"
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStore;
    use crate::marketplace::Page;
    use crate::types::Listing;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    /// Serves slices of a fixed inventory and records requested offsets.
    struct FixedSource {
        inventory: Vec<Listing>,
        offsets: Mutex<Vec<u64>>,
        fail_at: Option<u64>,
        max_limit: u32,
    }

    impl FixedSource {
        fn new(inventory: Vec<Listing>) -> Self {
            Self { inventory, offsets: Mutex::new(Vec::new()), fail_at: None, max_limit: u32::MAX }
        }
    }

    #[async_trait]
    impl ListingSource for FixedSource {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
            self.offsets.lock().unwrap().push(request.offset);
            if self.fail_at == Some(request.offset) {
                anyhow::bail!("connection reset");
            }
            let limit = request.limit.min(self.max_limit) as usize;
            let start = (request.offset as usize).min(self.inventory.len());
            let end = (start + limit).min(self.inventory.len());
            let raw = &self.inventory[start..end];
            // Unpriced items stand in for ones the marketplace sent but the
            // source could not convert.
            Ok(Page {
                listings: raw.iter().filter(|l| l.price_cents > 0).cloned().collect(),
                raw_len: raw.len(),
            })
        }

        fn max_page_size(&self) -> u32 {
            self.max_limit
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn listing(i: u32, key: Option<&str>) -> Listing {
        Listing {
            item_id: format!("item-{i}"),
            title: format!("Book {i}"),
            price_cents: 500,
            shipping_cents: 0,
            condition: None,
            seller: "bookbarn".into(),
            category_id: None,
            catalog_key: key.map(String::from),
            image_url: None,
            scraped_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(i as i64),
        }
    }

    fn inventory(n: u32) -> Vec<Listing> {
        (0..n).map(|i| listing(i, Some(&format!("key-{i:03}")))).collect()
    }

    fn search() -> Search {
        Search {
            seller: "bookbarn".into(),
            query: "textbook".into(),
            category_id: None,
            condition_id: None,
            pause_after_new: None,
        }
    }

    #[tokio::test]
    async fn test_crawl_to_completion() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(inventory(7));
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 3)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.inserted, 7);
        assert_eq!(report.next_offset, 7);
        assert!(report.completed);
        assert!(!report.paused);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 3, 6]);
        assert_eq!(dedup.len(), 7);
        let cp = store.load_checkpoint("bookbarn", "textbook").await.unwrap().unwrap();
        assert_eq!(cp.last_offset, 7);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_empty_page() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(inventory(6));
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 3)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(report.pages, 3);
        assert!(report.completed);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_unconvertible_items_still_advance_offset() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut stock = inventory(7);
        stock[1].price_cents = 0;
        let source = FixedSource::new(stock);
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 3)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        // Page one converts to two listings but is still a full page.
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 3, 6]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.scraped, 6);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.inserted, 6);
        assert_eq!(report.next_offset, 7);
        assert!(report.completed);
        let cp = store.load_checkpoint("bookbarn", "textbook").await.unwrap().unwrap();
        assert_eq!(cp.last_offset, 7);
    }

    #[tokio::test]
    async fn test_page_size_clamped_to_source_limit() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut source = FixedSource::new(inventory(7));
        source.max_limit = 3;
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 10)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 3, 6]);
        assert_eq!(report.inserted, 7);
        assert!(report.completed);
    }

    #[tokio::test]
    async fn test_known_keys_skipped_before_write() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(inventory(4));
        let mut dedup: DedupIndex = vec!["key-001".to_string(), "key-002".to_string()]
            .into_iter()
            .collect();

        let report = ListingScraper::new(&source, 10)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(report.already_known, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(store.count_entries().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_listings_without_key_not_persisted() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(vec![listing(0, None), listing(1, Some("key-001")), listing(2, None)]);
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 10)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(report.scraped, 3);
        assert_eq!(report.with_catalog_key, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_in_store_counted_not_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_listing(&listing(9, Some("key-000"))).await.unwrap();
        let source = FixedSource::new(inventory(2));
        // Index deliberately empty: the store still has the row.
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 10)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(report.inserted, 1);
        assert!(dedup.contains("key-000"));
    }

    #[tokio::test]
    async fn test_pause_after_threshold_stops_after_page() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(inventory(20));
        let mut dedup = DedupIndex::new();
        let mut s = search();
        s.pause_after_new = Some(4);

        let report = ListingScraper::new(&source, 3)
            .crawl(&s, 0, &mut dedup, &store, &store)
            .await
            .unwrap();

        // 3 after page one, 6 after page two.
        assert_eq!(report.pages, 2);
        assert_eq!(report.inserted, 6);
        assert!(report.paused);
        assert!(!report.completed);
        let cp = store.load_checkpoint("bookbarn", "textbook").await.unwrap().unwrap();
        assert_eq!(cp.last_offset, 6);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_last_checkpoint() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut source = FixedSource::new(inventory(10));
        source.fail_at = Some(6);
        let mut dedup = DedupIndex::new();

        let err = ListingScraper::new(&source, 3)
            .crawl(&search(), 0, &mut dedup, &store, &store)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("connection reset"));
        let cp = store.load_checkpoint("bookbarn", "textbook").await.unwrap().unwrap();
        assert_eq!(cp.last_offset, 6);
        assert_eq!(store.count_entries().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_resume_from_offset() {
        let store = SqliteStore::in_memory().await.unwrap();
        let source = FixedSource::new(inventory(8));
        let mut dedup = DedupIndex::new();

        let report = ListingScraper::new(&source, 3)
            .crawl(&search(), 6, &mut dedup, &store, &store)
            .await
            .unwrap();

        assert_eq!(*source.offsets.lock().unwrap(), vec![6]);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.next_offset, 8);
    }
}
