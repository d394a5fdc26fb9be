//! Core engine: the crawl → evaluate run.

pub mod evaluator;
pub mod pending;
pub mod report;
pub mod runner;
pub mod scanner;
