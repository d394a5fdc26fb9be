//! Pending work queue.
//!
//! Streams unevaluated catalog entries oldest-first in bounded keyset pages.
//! The cursor is the (scrape time, catalog key) of the last entry handed out,
//! so entries decided while the queue is being drained never shift later
//! pages.

use anyhow::Result;
use chrono::Utc;
use std::collections::VecDeque;
use tracing::debug;

use crate::storage::{CatalogStore, PendingCursor};
use crate::types::{CatalogEntry, EvaluationResult};

pub struct PendingQueue<'a> {
    store: &'a dyn CatalogStore,
    seller: Option<String>,
    page_size: u32,
    buffer: VecDeque<CatalogEntry>,
    cursor: Option<PendingCursor>,
    exhausted: bool,
}

impl<'a> PendingQueue<'a> {
    /// `seller` restricts the queue to one seller's entries.
    pub fn new(store: &'a dyn CatalogStore, seller: Option<String>, page_size: u32) -> Self {
        Self {
            store,
            seller,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Next pending entry, or `None` once the queue is drained.
    pub async fn next(&mut self) -> Result<Option<CatalogEntry>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        let entry = self.buffer.pop_front();
        if let Some(e) = &entry {
            self.cursor = Some(PendingCursor::after(e));
        }
        Ok(entry)
    }

    /// Drain the whole queue into memory.
    pub async fn collect_all(mut self) -> Result<Vec<CatalogEntry>> {
        let mut all = Vec::new();
        while let Some(entry) = self.next().await? {
            all.push(entry);
        }
        Ok(all)
    }

    /// Persist an evaluation for `catalog_key`, stamped now.
    pub async fn apply_evaluation(&self, catalog_key: &str, result: &EvaluationResult) -> Result<bool> {
        self.store.apply_evaluation(catalog_key, result, Utc::now()).await
    }

    async fn fill(&mut self) -> Result<()> {
        let page = self
            .store
            .pending_page(self.seller.as_deref(), self.cursor.as_ref(), self.page_size)
            .await?;
        debug!(fetched = page.len(), "Pending page loaded");
        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
