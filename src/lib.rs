//! FlipScout: marketplace book crawler and resale arbitrage evaluator.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod marketplace;
pub mod storage;
pub mod strategy;
pub mod types;
pub mod valuation;
