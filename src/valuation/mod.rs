//! Valuation service integration.
//!
//! Defines the `ValuationSource` trait and provides the Keepa implementation
//! plus the token bucket that paces calls to it.

pub mod keepa;
pub mod rate_limiter;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::ValuationPayload;

/// Abstraction over pricing / sales-history lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ValuationSource: Send + Sync {
    /// Look up a catalog key. `Ok(None)` means the service has no product
    /// for it; `Err` means the lookup itself failed.
    async fn lookup(&self, catalog_key: &str) -> Result<Option<ValuationPayload>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
