//! SQLite-backed catalog and checkpoint store.
//!
//! Timestamps are stored as milliseconds since the Unix epoch so that the
//! pending index orders by plain integer comparison.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{CatalogStore, CheckpointStore, InsertOutcome, PendingCursor};
use crate::types::{CatalogEntry, Checkpoint, Decision, EvaluationResult, Listing, ValuationFields};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS catalog (
        catalog_key            TEXT NOT NULL UNIQUE,
        item_id                TEXT NOT NULL,
        title                  TEXT NOT NULL,
        price_cents            INTEGER NOT NULL,
        shipping_cents         INTEGER NOT NULL DEFAULT 0,
        condition              TEXT,
        seller                 TEXT NOT NULL,
        category_id            TEXT,
        image_url              TEXT,
        scraped_at             INTEGER NOT NULL,
        decision               TEXT CHECK (decision IN ('BUY', 'REVIEW', 'REJECT', 'BOUGHT')),
        reason                 TEXT,
        external_id            TEXT,
        external_price_cents   INTEGER,
        estimated_resale_cents INTEGER,
        sales_rank             INTEGER,
        rank_drops             INTEGER,
        multiplier             REAL,
        fba_profit_cents       INTEGER,
        fbm_profit_cents       INTEGER,
        weight_oz              REAL,
        flags                  TEXT,
        evaluated_at           INTEGER,
        bought_at              INTEGER
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_catalog_pending
        ON catalog (scraped_at, catalog_key)
        WHERE decision IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS checkpoints (
        seller      TEXT NOT NULL,
        search_key  TEXT NOT NULL,
        last_offset INTEGER NOT NULL CHECK (last_offset >= 0),
        updated_at  INTEGER NOT NULL,
        PRIMARY KEY (seller, search_key)
    )
    "#,
];

const ENTRY_COLUMNS: &str = "catalog_key, item_id, title, price_cents, shipping_cents, condition, \
     seller, category_id, image_url, scraped_at, decision, reason, external_id, \
     external_price_cents, estimated_resale_cents, sales_rank, rank_drops, multiplier, \
     fba_profit_cents, fbm_profit_cents, weight_oz, flags, evaluated_at, bought_at";

/// Catalog + checkpoint store over a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "Catalog store ready");
        Ok(store)
    }

    /// Private in-memory database. The single connection is never recycled,
    /// so the data lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply catalog schema")?;
        }
        Ok(())
    }

    /// Number of catalog rows (all decisions).
    pub async fn count_entries(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM catalog")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Invalid stored timestamp: {ms}"))
}

fn entry_from_row(row: &SqliteRow) -> Result<CatalogEntry> {
    let decision = row
        .try_get::<Option<String>, _>("decision")?
        .map(|d| d.parse::<Decision>())
        .transpose()?;
    let flags: Option<String> = row.try_get("flags")?;

    Ok(CatalogEntry {
        catalog_key: row.try_get("catalog_key")?,
        item_id: row.try_get("item_id")?,
        title: row.try_get("title")?,
        price_cents: row.try_get("price_cents")?,
        shipping_cents: row.try_get("shipping_cents")?,
        condition: row.try_get("condition")?,
        seller: row.try_get("seller")?,
        category_id: row.try_get("category_id")?,
        image_url: row.try_get("image_url")?,
        scraped_at: from_millis(row.try_get("scraped_at")?)?,
        decision,
        reason: row.try_get("reason")?,
        valuation: ValuationFields {
            external_id: row.try_get("external_id")?,
            external_price_cents: row.try_get("external_price_cents")?,
            estimated_resale_cents: row.try_get("estimated_resale_cents")?,
            sales_rank: row.try_get("sales_rank")?,
            rank_drops: row.try_get("rank_drops")?,
            multiplier: row.try_get("multiplier")?,
            fba_profit_cents: row.try_get("fba_profit_cents")?,
            fbm_profit_cents: row.try_get("fbm_profit_cents")?,
            weight_oz: row.try_get("weight_oz")?,
            flags: ValuationFields::parse_flags(flags.as_deref()),
        },
        evaluated_at: row
            .try_get::<Option<i64>, _>("evaluated_at")?
            .map(from_millis)
            .transpose()?,
        bought_at: row
            .try_get::<Option<i64>, _>("bought_at")?
            .map(from_millis)
            .transpose()?,
    })
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn catalog_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT catalog_key FROM catalog")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read catalog keys")?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("catalog_key").map_err(Into::into))
            .collect()
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<InsertOutcome> {
        let key = listing
            .catalog_key
            .as_deref()
            .with_context(|| format!("Listing {} has no catalog key", listing.item_id))?;

        let result = sqlx::query(
            r#"
            INSERT INTO catalog (
                catalog_key, item_id, title, price_cents, shipping_cents,
                condition, seller, category_id, image_url, scraped_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(&listing.item_id)
        .bind(&listing.title)
        .bind(listing.price_cents)
        .bind(listing.shipping_cents)
        .bind(&listing.condition)
        .bind(&listing.seller)
        .bind(&listing.category_id)
        .bind(&listing.image_url)
        .bind(to_millis(listing.scraped_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(catalog_key = key, "Duplicate catalog key");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to insert catalog entry {key}")),
        }
    }

    async fn pending_page(
        &self,
        seller: Option<&str>,
        after: Option<&PendingCursor>,
        limit: u32,
    ) -> Result<Vec<CatalogEntry>> {
        let (after_ms, after_key) = match after {
            Some(c) => (to_millis(c.scraped_at), c.catalog_key.as_str()),
            None => (i64::MIN, ""),
        };

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM catalog
            WHERE decision IS NULL
              AND (?1 IS NULL OR seller = ?1)
              AND (scraped_at > ?2 OR (scraped_at = ?2 AND catalog_key > ?3))
            ORDER BY scraped_at ASC, catalog_key ASC
            LIMIT ?4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(seller)
            .bind(after_ms)
            .bind(after_key)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("Failed to read pending catalog entries")?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn apply_evaluation(
        &self,
        catalog_key: &str,
        result: &EvaluationResult,
        evaluated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let f = &result.fields;
        let done = sqlx::query(
            r#"
            UPDATE catalog SET
                decision               = ?,
                reason                 = ?,
                external_id            = COALESCE(?, external_id),
                external_price_cents   = COALESCE(?, external_price_cents),
                estimated_resale_cents = COALESCE(?, estimated_resale_cents),
                sales_rank             = COALESCE(?, sales_rank),
                rank_drops             = COALESCE(?, rank_drops),
                multiplier             = COALESCE(?, multiplier),
                fba_profit_cents       = COALESCE(?, fba_profit_cents),
                fbm_profit_cents       = COALESCE(?, fbm_profit_cents),
                weight_oz              = COALESCE(?, weight_oz),
                flags                  = COALESCE(?, flags),
                evaluated_at           = ?
            WHERE catalog_key = ?
            "#,
        )
        .bind(result.decision.as_str())
        .bind(&result.reason)
        .bind(&f.external_id)
        .bind(f.external_price_cents)
        .bind(f.estimated_resale_cents)
        .bind(f.sales_rank)
        .bind(f.rank_drops)
        .bind(f.multiplier)
        .bind(f.fba_profit_cents)
        .bind(f.fbm_profit_cents)
        .bind(f.weight_oz)
        .bind(f.flags_column())
        .bind(to_millis(evaluated_at))
        .bind(catalog_key)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write evaluation for {catalog_key}"))?;

        Ok(done.rows_affected() > 0)
    }

    async fn mark_bought(&self, catalog_key: &str, bought_at: DateTime<Utc>) -> Result<bool> {
        let done = sqlx::query("UPDATE catalog SET decision = 'BOUGHT', bought_at = ? WHERE catalog_key = ?")
            .bind(to_millis(bought_at))
            .bind(catalog_key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to mark {catalog_key} as bought"))?;
        Ok(done.rows_affected() > 0)
    }

    async fn get_entry(&self, catalog_key: &str) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM catalog WHERE catalog_key = ?");
        let row = sqlx::query(&sql)
            .bind(catalog_key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read catalog entry {catalog_key}"))?;
        row.as_ref().map(entry_from_row).transpose()
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load_checkpoint(&self, seller: &str, search_key: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT last_offset, updated_at FROM checkpoints WHERE seller = ? AND search_key = ?",
        )
        .bind(seller)
        .bind(search_key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read checkpoint for {seller}/{search_key}"))?;

        row.map(|r| -> Result<Checkpoint> {
            let offset: i64 = r.try_get("last_offset")?;
            Ok(Checkpoint {
                seller: seller.to_string(),
                search_key: search_key.to_string(),
                last_offset: u64::try_from(offset).context("Negative checkpoint offset")?,
                updated_at: from_millis(r.try_get("updated_at")?)?,
            })
        })
        .transpose()
    }

    async fn save_checkpoint(&self, seller: &str, search_key: &str, offset: u64) -> Result<()> {
        let offset = i64::try_from(offset).context("Checkpoint offset out of range")?;
        sqlx::query(
            r#"
            INSERT INTO checkpoints (seller, search_key, last_offset, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (seller, search_key) DO UPDATE SET
                last_offset = excluded.last_offset,
                updated_at  = excluded.updated_at
            "#,
        )
        .bind(seller)
        .bind(search_key)
        .bind(offset)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save checkpoint for {seller}/{search_key}"))?;

        debug!(seller, search_key, offset, "Checkpoint saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
