//! Marketplace integrations.
//!
//! Defines the `ListingSource` trait the scraper pages through and provides
//! the eBay Browse API implementation.

pub mod ebay;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Listing, Search};

/// One page of a seller search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub seller: String,
    pub query: String,
    pub category_id: Option<String>,
    pub condition_id: Option<String>,
    pub offset: u64,
    pub limit: u32,
}

impl PageRequest {
    pub fn for_search(search: &Search, offset: u64, limit: u32) -> Self {
        Self {
            seller: search.seller.clone(),
            query: search.query.trim().to_string(),
            category_id: search.category_id.clone(),
            condition_id: search.condition_id.clone(),
            offset,
            limit,
        }
    }
}

/// One page as returned by the marketplace.
///
/// `raw_len` counts every item the marketplace sent, including ones the
/// source could not turn into a `Listing`. Offsets and end-of-results are
/// measured in raw items.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub listings: Vec<Listing>,
    pub raw_len: usize,
}

impl Page {
    /// A page where every raw item converted.
    pub fn unfiltered(listings: Vec<Listing>) -> Self {
        let raw_len = listings.len();
        Self { listings, raw_len }
    }

    pub fn dropped(&self) -> usize {
        self.raw_len.saturating_sub(self.listings.len())
    }
}

/// Abstraction over marketplace listing searches.
///
/// Pages are addressed by offset. A page whose `raw_len` is shorter than
/// `limit` (or zero) means the result set is exhausted.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page of listings. Listings without a recognisable catalog
    /// key are still returned, with `catalog_key = None`.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;

    /// Largest `limit` the source honours.
    fn max_page_size(&self) -> u32 {
        u32::MAX
    }

    /// Source name for logging.
    fn name(&self) -> &str;
}
