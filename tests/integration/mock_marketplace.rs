//! Mock marketplace for integration testing.
//!
//! Provides a deterministic `ListingSource` that serves offset pages out of
//! an in-memory inventory per seller and records every request.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use flipscout::marketplace::{ListingSource, Page, PageRequest};
use flipscout::types::Listing;

pub struct MockMarketplace {
    inventory: Vec<Listing>,
    requests: Arc<Mutex<Vec<PageRequest>>>,
    /// If set, every request for this seller fails.
    failing_seller: Arc<Mutex<Option<String>>>,
    /// If set, the request at this offset fails.
    fail_at_offset: Arc<Mutex<Option<u64>>>,
}

impl MockMarketplace {
    pub fn new(inventory: Vec<Listing>) -> Self {
        Self {
            inventory,
            requests: Arc::new(Mutex::new(Vec::new())),
            failing_seller: Arc::new(Mutex::new(None)),
            fail_at_offset: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_seller(&self, seller: &str) {
        *self.failing_seller.lock().unwrap() = Some(seller.to_string());
    }

    pub fn fail_at_offset(&self, offset: u64) {
        *self.fail_at_offset.lock().unwrap() = Some(offset);
    }

    pub fn clear_errors(&self) {
        *self.failing_seller.lock().unwrap() = None;
        *self.fail_at_offset.lock().unwrap() = None;
    }

    /// Offsets requested so far, in order.
    pub fn offsets(&self) -> Vec<u64> {
        self.requests.lock().unwrap().iter().map(|r| r.offset).collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl ListingSource for MockMarketplace {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        self.requests.lock().unwrap().push(request.clone());

        if self.failing_seller.lock().unwrap().as_deref() == Some(request.seller.as_str()) {
            return Err(anyhow!("mock marketplace unavailable for {}", request.seller));
        }
        if *self.fail_at_offset.lock().unwrap() == Some(request.offset) {
            return Err(anyhow!("mock connection reset at offset {}", request.offset));
        }

        let listings: Vec<&Listing> = self
            .inventory
            .iter()
            .filter(|l| l.seller == request.seller)
            .collect();
        let start = (request.offset as usize).min(listings.len());
        let end = (start + request.limit as usize).min(listings.len());
        Ok(Page::unfiltered(
            listings[start..end].iter().map(|l| (*l).clone()).collect(),
        ))
    }

    fn name(&self) -> &str {
        "mock-marketplace"
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// A $10 + $3 shipping book listing.
pub fn book(seller: &str, catalog_key: Option<&str>, minute: i64) -> Listing {
    Listing {
        item_id: format!("v1|{seller}-{minute}|0"),
        title: format!("Used textbook #{minute}"),
        price_cents: 1000,
        shipping_cents: 300,
        condition: Some("Good".to_string()),
        seller: seller.to_string(),
        category_id: Some("267".to_string()),
        catalog_key: catalog_key.map(String::from),
        image_url: None,
        scraped_at: base_time() + Duration::minutes(minute),
    }
}

/// `n` keyed listings for one seller, keys `<seller>-NNNN`, one minute apart.
pub fn inventory(seller: &str, n: i64) -> Vec<Listing> {
    (0..n)
        .map(|i| book(seller, Some(&format!("{seller}-{i:04}")), i))
        .collect()
}
