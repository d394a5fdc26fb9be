//! Mock valuation service for integration testing.
//!
//! Answers lookups from a fixed map; unknown keys are "not found". Records
//! the lookup order so tests can check pending-queue ordering.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flipscout::types::ValuationPayload;
use flipscout::valuation::ValuationSource;

use crate::mock_marketplace::base_time;

pub struct MockValuation {
    products: HashMap<String, ValuationPayload>,
    lookups: Arc<Mutex<Vec<String>>>,
    /// If set, all lookups will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockValuation {
    pub fn new() -> Self {
        Self {
            products: HashMap::new(),
            lookups: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_product(mut self, catalog_key: &str, payload: ValuationPayload) -> Self {
        self.products.insert(catalog_key.to_string(), payload);
        self
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ValuationSource for MockValuation {
    async fn lookup(&self, catalog_key: &str) -> Result<Option<ValuationPayload>> {
        self.lookups.lock().unwrap().push(catalog_key.to_string());
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        Ok(self.products.get(catalog_key).cloned())
    }

    fn name(&self) -> &str {
        "mock-valuation"
    }
}

/// Steady seller: $40 buy box, rank 25k, 12 drops, one pound.
pub fn steady_seller() -> ValuationPayload {
    ValuationPayload {
        external_id: "B0STEADY01".to_string(),
        title: Some("Steady seller".to_string()),
        buy_box_price: Some(40.0),
        new_price: Some(42.0),
        used_price: Some(30.0),
        amazon_price: None,
        sales_rank: Some(25_000),
        rank_history: Vec::new(),
        rank_drops: Some(12),
        amazon_oos_ratio: None,
        weight_grams: Some(453.6),
        observed_at: base_time(),
    }
}

/// Thin margin: $22 buy box, rank 900k.
pub fn marginal_seller() -> ValuationPayload {
    ValuationPayload {
        external_id: "B0MARGIN01".to_string(),
        buy_box_price: Some(22.0),
        new_price: None,
        used_price: None,
        sales_rank: Some(900_000),
        ..steady_seller()
    }
}
