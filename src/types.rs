//! Shared types for FlipScout.
//!
//! These types form the data model used across all modules: raw marketplace
//! listings, durable catalog entries, checkpoints, valuation payloads and the
//! evaluation result written back to the catalog.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Largest magnitude (in cents, ranks or counts) that may be persisted.
/// Anything outside ±this bound is dropped rather than clamped or wrapped.
pub const SAFE_INT_BOUND: i64 = 2_000_000_000;

/// Convert a dollar amount to integer cents, rounding half away from zero.
///
/// Returns `None` for non-finite input or when the result falls outside
/// [`SAFE_INT_BOUND`].
pub fn to_minor_units(dollars: f64) -> Option<i64> {
    if !dollars.is_finite() {
        return None;
    }
    let cents = Decimal::from_f64(dollars)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_i64()?;
    guard_int(cents)
}

/// Convert integer cents to dollars.
pub fn from_minor_units(cents: i64) -> f64 {
    Decimal::new(cents, 2).to_f64().unwrap_or(0.0)
}

/// Keep an integer only if it lies within the persistence-safe bound.
pub fn guard_int(value: i64) -> Option<i64> {
    if (-SAFE_INT_BOUND..=SAFE_INT_BOUND).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Keep a float only if it is finite.
pub fn guard_float(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// A raw marketplace listing. Only lives for the duration of a scrape page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub item_id: String,
    pub title: String,
    pub price_cents: i64,
    pub shipping_cents: i64,
    pub condition: Option<String>,
    pub seller: String,
    pub category_id: Option<String>,
    /// Normalised ISBN-13. Listings without one are never persisted.
    pub catalog_key: Option<String>,
    pub image_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ${:.2} + ${:.2} ship ({})",
            self.catalog_key.as_deref().unwrap_or("no-key"),
            self.title,
            from_minor_units(self.price_cents),
            from_minor_units(self.shipping_cents),
            self.seller,
        )
    }
}

impl Listing {
    /// Price plus shipping, in dollars.
    pub fn buy_price(&self) -> f64 {
        from_minor_units(self.price_cents.saturating_add(self.shipping_cents))
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Terminal state of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Review,
    Reject,
    Bought,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Review => "REVIEW",
            Decision::Reject => "REJECT",
            Decision::Bought => "BOUGHT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Decision::Buy),
            "REVIEW" => Ok(Decision::Review),
            "REJECT" => Ok(Decision::Reject),
            "BOUGHT" => Ok(Decision::Bought),
            _ => Err(anyhow::anyhow!("Unknown decision: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Valuation-derived fields of a catalog entry. Every field is optional:
/// `None` means "not known", and is never written over an existing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationFields {
    /// External product id (ASIN).
    pub external_id: Option<String>,
    pub external_price_cents: Option<i64>,
    pub estimated_resale_cents: Option<i64>,
    pub sales_rank: Option<i64>,
    pub rank_drops: Option<i64>,
    pub multiplier: Option<f64>,
    pub fba_profit_cents: Option<i64>,
    pub fbm_profit_cents: Option<i64>,
    pub weight_oz: Option<f64>,
    pub flags: Vec<String>,
}

impl ValuationFields {
    /// Flags joined for storage; `None` when there are none.
    pub fn flags_column(&self) -> Option<String> {
        if self.flags.is_empty() {
            None
        } else {
            Some(self.flags.join(","))
        }
    }

    /// Inverse of [`ValuationFields::flags_column`].
    pub fn parse_flags(column: Option<&str>) -> Vec<String> {
        column
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Output of the evaluation engine for one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: Decision,
    /// Short human-readable driver of the decision.
    pub reason: String,
    pub fields: ValuationFields,
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.decision, self.reason)?;
        if let Some(m) = self.fields.multiplier {
            write!(f, " x{m:.2}")?;
        }
        if let Some(p) = self.fields.fba_profit_cents {
            write!(f, " fba=${:.2}", from_minor_units(p))?;
        }
        if let Some(p) = self.fields.fbm_profit_cents {
            write!(f, " fbm=${:.2}", from_minor_units(p))?;
        }
        Ok(())
    }
}

impl EvaluationResult {
    /// REJECT with every valuation field unset.
    pub fn no_data(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            reason: reason.into(),
            fields: ValuationFields::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog entry
// ---------------------------------------------------------------------------

/// Durable catalog record keyed by catalog key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub catalog_key: String,
    pub item_id: String,
    pub title: String,
    pub price_cents: i64,
    pub shipping_cents: i64,
    pub condition: Option<String>,
    pub seller: String,
    pub category_id: Option<String>,
    pub image_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
    /// `None` exactly until an evaluation has been written.
    pub decision: Option<Decision>,
    pub reason: Option<String>,
    pub valuation: ValuationFields,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub bought_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Acquisition cost (price + shipping) in dollars.
    pub fn buy_price(&self) -> f64 {
        from_minor_units(self.price_cents.saturating_add(self.shipping_cents))
    }

    pub fn is_pending(&self) -> bool {
        self.decision.is_none()
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Resume marker for one (seller, search) crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub seller: String,
    pub search_key: String,
    pub last_offset: u64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One configured marketplace search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub seller: String,
    pub query: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    /// Stop the crawl once this many new entries were inserted in a run.
    #[serde(default)]
    pub pause_after_new: Option<u64>,
}

impl fmt::Display for Search {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.search_key(), self.seller)
    }
}

impl Search {
    /// Checkpoint key: the query plus any active filters.
    pub fn search_key(&self) -> String {
        let mut key = self.query.trim().to_string();
        if let Some(cat) = &self.category_id {
            key.push_str(&format!("|cat={cat}"));
        }
        if let Some(cond) = &self.condition_id {
            key.push_str(&format!("|cond={cond}"));
        }
        key
    }
}

// ---------------------------------------------------------------------------
// Valuation payload
// ---------------------------------------------------------------------------

/// One sales-rank observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankPoint {
    pub at: DateTime<Utc>,
    pub rank: i64,
}

/// Pricing and sales-history data for a catalog key, as returned by the
/// valuation service. Prices are in dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationPayload {
    pub external_id: String,
    pub title: Option<String>,
    pub buy_box_price: Option<f64>,
    pub new_price: Option<f64>,
    pub used_price: Option<f64>,
    /// Amazon's own offer, when Amazon is selling.
    pub amazon_price: Option<f64>,
    pub sales_rank: Option<i64>,
    /// Chronological rank history.
    pub rank_history: Vec<RankPoint>,
    /// Rank-drop count precomputed by the provider over its stats window.
    pub rank_drops: Option<u32>,
    /// Fraction (0–1) of the stats window Amazon was out of stock.
    pub amazon_oos_ratio: Option<f64>,
    pub weight_grams: Option<f64>,
    /// When the provider produced this snapshot; anchors the trailing window.
    pub observed_at: DateTime<Utc>,
}

impl ValuationPayload {
    /// Minimal payload for tests.
    #[cfg(test)]
    pub fn sample() -> Self {
        ValuationPayload {
            external_id: "B000TEST01".to_string(),
            title: Some("Test Book".to_string()),
            buy_box_price: Some(40.0),
            new_price: Some(42.0),
            used_price: Some(30.0),
            amazon_price: None,
            sales_rank: Some(25_000),
            rank_history: Vec::new(),
            rank_drops: Some(12),
            amazon_oos_ratio: None,
            weight_grams: Some(453.6),
            observed_at: DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for FlipScout.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("Missing credential {name}: environment variable {env_var} is not set")]
    MissingCredential { name: String, env_var: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Marketplace error ({status}): {message}")]
    Marketplace { status: u16, message: String },

    #[error("Valuation error ({status}): {message}")]
    Valuation { status: u16, message: String },

    #[error("Catalog entry not found: {0}")]
    EntryNotFound(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
