//! Integration tests: full crawl → evaluate runs against mock sources and
//! an in-memory catalog.

mod mock_marketplace;
mod mock_valuation;
mod pipeline;
