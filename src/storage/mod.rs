//! Persistence layer.
//!
//! Defines the `CatalogStore` and `CheckpointStore` traits the engine works
//! against, and provides the SQLite implementation in [`sqlite`].

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{CatalogEntry, Checkpoint, EvaluationResult, Listing};

/// Outcome of inserting one listing into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The catalog key already exists. Expected, not an error.
    Duplicate,
}

/// Keyset position in the pending sequence: (scrape time, catalog key) of
/// the last entry handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCursor {
    pub scraped_at: DateTime<Utc>,
    pub catalog_key: String,
}

impl PendingCursor {
    pub fn after(entry: &CatalogEntry) -> Self {
        Self {
            scraped_at: entry.scraped_at,
            catalog_key: entry.catalog_key.clone(),
        }
    }
}

/// Durable catalog of scraped entries and their evaluations.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every catalog key currently stored.
    async fn catalog_keys(&self) -> Result<Vec<String>>;

    /// Insert a listing as a new, unevaluated entry.
    ///
    /// A unique-key conflict yields `InsertOutcome::Duplicate`; any other
    /// failure is an error. Listings without a catalog key are an error.
    async fn insert_listing(&self, listing: &Listing) -> Result<InsertOutcome>;

    /// Up to `limit` unevaluated entries strictly after `after`, ordered by
    /// scrape time then catalog key.
    async fn pending_page(
        &self,
        seller: Option<&str>,
        after: Option<&PendingCursor>,
        limit: u32,
    ) -> Result<Vec<CatalogEntry>>;

    /// Write an evaluation. Absent fields leave stored values untouched;
    /// decision, reason and `evaluated_at` are always written. Returns
    /// `false` if no entry has this key.
    async fn apply_evaluation(
        &self,
        catalog_key: &str,
        result: &EvaluationResult,
        evaluated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Mark an entry as bought. Returns `false` if no entry has this key.
    async fn mark_bought(&self, catalog_key: &str, bought_at: DateTime<Utc>) -> Result<bool>;

    async fn get_entry(&self, catalog_key: &str) -> Result<Option<CatalogEntry>>;
}

/// Per-(seller, search) resume offsets.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(&self, seller: &str, search_key: &str) -> Result<Option<Checkpoint>>;

    /// Upsert the offset for (seller, search key).
    async fn save_checkpoint(&self, seller: &str, search_key: &str, offset: u64) -> Result<()>;
}
