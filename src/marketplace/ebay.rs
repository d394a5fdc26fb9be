//! eBay Browse API integration.
//!
//! API docs: https://developer.ebay.com/api-docs/buy/browse/resources/item_summary/methods/search
//! Base URL: https://api.ebay.com/buy/browse/v1
//! Rate limit: 5,000 calls/day on the default application tier.
//! Auth: `Authorization: Bearer {application token}`.
//!
//! The token itself is minted out of band and supplied through the
//! environment; this client never refreshes it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ListingSource, Page, PageRequest};
use crate::catalog::{extract_isbn, normalize_isbn};
use crate::config::MarketplaceConfig;
use crate::types::{guard_int, Listing, ScoutError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SOURCE_NAME: &str = "ebay";

/// Browse API hard limit on `limit`.
pub const MAX_PAGE_SIZE: u32 = 200;

// ---------------------------------------------------------------------------
// API response types (Browse JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    item_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Option<Amount>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    seller: Option<SellerSummary>,
    #[serde(default)]
    shipping_options: Vec<ShippingOption>,
    #[serde(default)]
    categories: Vec<CategorySummary>,
    #[serde(default)]
    image: Option<Image>,
    /// Present on catalog-linked items.
    #[serde(default)]
    gtin: Option<String>,
}

/// Money as eBay sends it: a decimal string plus currency.
#[derive(Debug, Deserialize)]
struct Amount {
    value: String,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SellerSummary {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippingOption {
    #[serde(default)]
    shipping_cost: Option<Amount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategorySummary {
    category_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Image {
    #[serde(default)]
    image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// eBay Browse API client.
pub struct EbayClient {
    http: Client,
    base_url: String,
    token: SecretString,
    marketplace_id: String,
}

impl EbayClient {
    pub fn new(token: SecretString, cfg: &MarketplaceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("FlipScout/0.1.0")
            .build()
            .context("Failed to build HTTP client for eBay")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token,
            marketplace_id: cfg.marketplace_id.clone(),
        })
    }

    fn search_url(&self, request: &PageRequest) -> String {
        let mut filter = format!("sellers:{{{}}}", request.seller);
        if let Some(cond) = &request.condition_id {
            filter.push_str(&format!(",conditionIds:{{{cond}}}"));
        }

        let mut url = format!(
            "{}/item_summary/search?q={}&filter={}&limit={}&offset={}",
            self.base_url,
            urlencoding::encode(&request.query),
            urlencoding::encode(&filter),
            request.limit.min(MAX_PAGE_SIZE),
            request.offset,
        );
        if let Some(cat) = &request.category_id {
            url.push_str(&format!("&category_ids={}", urlencoding::encode(cat)));
        }
        url
    }
}

#[async_trait]
impl ListingSource for EbayClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let url = self.search_url(request);
        debug!(
            seller = %request.seller,
            offset = request.offset,
            limit = request.limit,
            "Fetching eBay search page"
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace_id)
            .send()
            .await
            .context("eBay search request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScoutError::Marketplace { status, message: body }.into());
        }

        let page: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse eBay search response")?;

        debug!(
            total = ?page.total,
            returned = page.item_summaries.len(),
            "eBay search page received"
        );

        Ok(convert_page(page, &request.seller, Utc::now()))
    }

    fn max_page_size(&self) -> u32 {
        MAX_PAGE_SIZE
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert every summary, keeping the raw item count for paging.
fn convert_page(resp: SearchResponse, seller: &str, scraped_at: DateTime<Utc>) -> Page {
    let raw_len = resp.item_summaries.len();
    let listings = resp
        .item_summaries
        .into_iter()
        .filter_map(|item| to_listing(item, seller, scraped_at))
        .collect();
    Page { listings, raw_len }
}

/// Decimal money string → cents, rounding half away from zero.
fn parse_cents(amount: &Amount) -> Option<i64> {
    if amount.currency.as_deref().is_some_and(|c| c != "USD") {
        return None;
    }
    let value: Decimal = amount.value.trim().parse().ok()?;
    let cents = (value * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()?;
    guard_int(cents)
}

/// Map a summary to a `Listing`. Items without a usable price are dropped;
/// the price is what we pay, so nothing can be evaluated without it.
fn to_listing(item: ItemSummary, seller: &str, scraped_at: DateTime<Utc>) -> Option<Listing> {
    let Some(price_cents) = item.price.as_ref().and_then(parse_cents) else {
        warn!(item_id = %item.item_id, "Listing has no usable price, skipping");
        return None;
    };

    // Missing shipping cost means free or calculated; treat both as zero.
    let shipping_cents = item
        .shipping_options
        .first()
        .and_then(|opt| opt.shipping_cost.as_ref())
        .and_then(parse_cents)
        .unwrap_or(0);

    let catalog_key = item
        .gtin
        .as_deref()
        .and_then(normalize_isbn)
        .or_else(|| extract_isbn(&item.title));

    Some(Listing {
        item_id: item.item_id,
        title: item.title,
        price_cents,
        shipping_cents,
        condition: item.condition,
        seller: item
            .seller
            .and_then(|s| s.username)
            .unwrap_or_else(|| seller.to_string()),
        category_id: item.categories.into_iter().next().map(|c| c.category_id),
        catalog_key,
        image_url: item.image.and_then(|i| i.image_url),
        scraped_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
