//! Keepa product API client.
//!
//! API docs: https://keepa.com/#!discuss/t/product-object/116
//! Base URL: https://api.keepa.com/
//! Rate limit: token based, refilled per minute according to the plan.
//! Auth: `key` query parameter.
//!
//! Keepa encodes prices as integer cents with `-1` for "no offer", weights in
//! grams, and times as "Keepa minutes" (minutes since 2011-01-01).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ValuationSource;
use crate::config::ValuationConfig;
use crate::types::{from_minor_units, RankPoint, ScoutError, ValuationPayload};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PROVIDER_NAME: &str = "keepa";

/// Offset between Keepa minutes and Unix minutes.
const KEEPA_MINUTE_OFFSET: i64 = 21_564_000;

/// Indices into `csv` / `stats.current`.
const CSV_AMAZON: usize = 0;
const CSV_NEW: usize = 1;
const CSV_USED: usize = 2;
const CSV_SALES_RANK: usize = 3;

// ---------------------------------------------------------------------------
// API response types (Keepa JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepaResponse {
    /// Server time, ms since epoch.
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    tokens_left: Option<i64>,
    #[serde(default)]
    refill_in: Option<i64>,
    #[serde(default)]
    products: Option<Vec<KeepaProduct>>,
    #[serde(default)]
    error: Option<KeepaError>,
}

#[derive(Debug, Deserialize)]
struct KeepaError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepaProduct {
    #[serde(default)]
    asin: Option<String>,
    #[serde(default)]
    title: Option<String>,
    /// Price / rank histories as flat `[time, value, time, value, ...]`.
    #[serde(default)]
    csv: Option<Vec<Option<Vec<i64>>>>,
    #[serde(default)]
    package_weight: Option<i64>,
    #[serde(default)]
    item_weight: Option<i64>,
    #[serde(default)]
    stats: Option<KeepaStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeepaStats {
    #[serde(default)]
    current: Option<Vec<i64>>,
    #[serde(default)]
    buy_box_price: Option<i64>,
    #[serde(default)]
    sales_rank_drops90: Option<i64>,
    /// Percent (0–100) per csv type.
    #[serde(default)]
    out_of_stock_percentage90: Option<Vec<i64>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Keepa valuation client.
pub struct KeepaClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    domain: u8,
    stats_days: u32,
}

impl KeepaClient {
    pub fn new(api_key: SecretString, cfg: &ValuationConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("FlipScout/0.1.0")
            .build()
            .context("Failed to build HTTP client for Keepa")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            domain: cfg.domain,
            stats_days: cfg.stats_days,
        })
    }

    async fn fetch_product(&self, code: &str) -> Result<KeepaResponse> {
        let url = format!(
            "{}/product?key={}&domain={}&code={}&stats={}&history=1",
            self.base_url,
            urlencoding::encode(self.api_key.expose_secret()),
            self.domain,
            urlencoding::encode(code),
            self.stats_days,
        );

        debug!(code, "Fetching Keepa product");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Keepa API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ScoutError::Valuation { status, message: body }.into());
        }

        resp.json::<KeepaResponse>()
            .await
            .context("Failed to parse Keepa product response")
    }
}

#[async_trait]
impl ValuationSource for KeepaClient {
    async fn lookup(&self, catalog_key: &str) -> Result<Option<ValuationPayload>> {
        let response = self.fetch_product(catalog_key).await?;

        if let Some(err) = &response.error {
            anyhow::bail!(
                "Keepa error for {catalog_key}: {}",
                err.message.as_deref().unwrap_or("unknown")
            );
        }
        debug!(
            tokens_left = ?response.tokens_left,
            refill_in_ms = ?response.refill_in,
            "Keepa token status"
        );

        let observed_at = response
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let payload = response
            .products
            .unwrap_or_default()
            .into_iter()
            .find_map(|p| to_payload(p, observed_at));

        if payload.is_none() {
            warn!(catalog_key, "Keepa has no product for catalog key");
        }
        Ok(payload)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn keepa_minutes_to_datetime(minutes: i64) -> Option<DateTime<Utc>> {
    let secs = minutes.checked_add(KEEPA_MINUTE_OFFSET)?.checked_mul(60)?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Keepa cents → dollars, treating non-positive values as "no offer".
fn keepa_price(cents: Option<i64>) -> Option<f64> {
    cents.filter(|c| *c > 0).map(from_minor_units)
}

fn current_value(stats: Option<&KeepaStats>, index: usize) -> Option<i64> {
    stats
        .and_then(|s| s.current.as_ref())
        .and_then(|c| c.get(index).copied())
        .filter(|v| *v >= 0)
}

fn rank_history(csv: Option<&Vec<Option<Vec<i64>>>>) -> Vec<RankPoint> {
    let Some(series) = csv.and_then(|c| c.get(CSV_SALES_RANK)).and_then(|s| s.as_ref()) else {
        return Vec::new();
    };
    series
        .chunks_exact(2)
        .filter(|pair| pair[1] > 0)
        .filter_map(|pair| {
            keepa_minutes_to_datetime(pair[0]).map(|at| RankPoint { at, rank: pair[1] })
        })
        .collect()
}

/// Map a Keepa product to our payload. `None` if it carries no ASIN.
fn to_payload(product: KeepaProduct, observed_at: DateTime<Utc>) -> Option<ValuationPayload> {
    let external_id = product.asin.filter(|a| !a.is_empty())?;
    let stats = product.stats.as_ref();

    let weight_grams = product
        .package_weight
        .filter(|w| *w > 0)
        .or(product.item_weight.filter(|w| *w > 0))
        .map(|w| w as f64);

    Some(ValuationPayload {
        external_id,
        title: product.title.clone(),
        buy_box_price: keepa_price(stats.and_then(|s| s.buy_box_price)),
        new_price: keepa_price(current_value(stats, CSV_NEW)),
        used_price: keepa_price(current_value(stats, CSV_USED)),
        amazon_price: keepa_price(current_value(stats, CSV_AMAZON)),
        sales_rank: current_value(stats, CSV_SALES_RANK).filter(|r| *r > 0),
        rank_history: rank_history(product.csv.as_ref()),
        rank_drops: stats
            .and_then(|s| s.sales_rank_drops90)
            .filter(|d| *d >= 0)
            .and_then(|d| u32::try_from(d).ok()),
        amazon_oos_ratio: stats
            .and_then(|s| s.out_of_stock_percentage90.as_ref())
            .and_then(|p| p.get(CSV_AMAZON).copied())
            .filter(|p| (0..=100).contains(p))
            .map(|p| p as f64 / 100.0),
        weight_grams,
        observed_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
