//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path in `FLIPSCOUT_CONFIG`) and deserializes
//! into strongly-typed structs. Secrets (API token, API key) are referenced
//! by env-var name in the config and resolved at startup into `SecretString`s.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::marketplace::ebay::MAX_PAGE_SIZE;
use crate::strategy::EvaluationConfig;
use crate::types::{ScoutError, Search};

/// Env var that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "FLIPSCOUT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub run: RunConfig,
    pub marketplace: MarketplaceConfig,
    pub valuation: ValuationConfig,
    pub evaluation: EvaluationConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub searches: Vec<Search>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub name: String,
    /// Pause after every valuation lookup.
    #[serde(default)]
    pub lookup_delay_ms: u64,
    /// Only evaluate pending entries from this seller.
    #[serde(default)]
    pub pending_seller: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    /// Env var holding the OAuth application token.
    pub token_env: String,
    #[serde(default = "default_marketplace_id")]
    pub marketplace_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValuationConfig {
    pub base_url: String,
    /// Env var holding the API key.
    pub api_key_env: String,
    /// Amazon locale (1 = .com).
    #[serde(default = "default_domain")]
    pub domain: u8,
    #[serde(default = "default_stats_days")]
    pub stats_days: u32,
    pub tokens_per_minute: u32,
    pub bucket_capacity: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    #[serde(default = "default_pending_page_size")]
    pub pending_page_size: u32,
}

fn default_marketplace_id() -> String {
    "EBAY_US".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_domain() -> u8 {
    1
}

fn default_stats_days() -> u32 {
    90
}

fn default_pending_page_size() -> u32 {
    100
}

/// Secrets resolved from the environment.
pub struct Credentials {
    pub marketplace_token: SecretString,
    pub valuation_key: SecretString,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Config path from `FLIPSCOUT_CONFIG`, else `config.toml`.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Reject settings that would make a run loop forever or do nothing.
    pub fn validate(&self) -> Result<(), ScoutError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.marketplace.page_size) {
            return Err(ScoutError::Config(format!(
                "marketplace.page_size must be in 1..={MAX_PAGE_SIZE}"
            )));
        }
        if self.valuation.bucket_capacity == 0 {
            return Err(ScoutError::Config("valuation.bucket_capacity must be > 0".into()));
        }
        if self.valuation.tokens_per_minute == 0 {
            return Err(ScoutError::Config("valuation.tokens_per_minute must be > 0".into()));
        }
        if self.storage.pending_page_size == 0 {
            return Err(ScoutError::Config("storage.pending_page_size must be > 0".into()));
        }
        if !(self.evaluation.min_multiplier.is_finite() && self.evaluation.min_profit.is_finite()) {
            return Err(ScoutError::Config("evaluation thresholds must be finite".into()));
        }
        for (i, search) in self.searches.iter().enumerate() {
            if search.seller.trim().is_empty() {
                return Err(ScoutError::Config(format!("searches[{i}].seller is empty")));
            }
            if search.query.trim().is_empty() {
                return Err(ScoutError::Config(format!("searches[{i}].query is empty")));
            }
        }
        Ok(())
    }

    /// Resolve both API secrets. Fails on the first one missing.
    pub fn credentials(&self) -> Result<Credentials, ScoutError> {
        let marketplace_token = Self::resolve_secret(&self.marketplace.token_env, "marketplace token")?;
        let valuation_key = Self::resolve_secret(&self.valuation.api_key_env, "valuation API key")?;
        Ok(Credentials {
            marketplace_token,
            valuation_key,
        })
    }

    fn resolve_secret(env_name: &str, what: &str) -> Result<SecretString, ScoutError> {
        match std::env::var(env_name) {
            Ok(v) if !v.trim().is_empty() => Ok(SecretString::new(v)),
            _ => Err(ScoutError::MissingCredential {
                name: what.to_string(),
                env_var: env_name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_TOML: &str = r#"
[run]
name = "test-run"
lookup_delay_ms = 250

[marketplace]
base_url = "https://api.ebay.com/buy/browse/v1"
token_env = "FLIPSCOUT_TEST_EBAY_TOKEN"

[valuation]
base_url = "https://api.keepa.com"
api_key_env = "FLIPSCOUT_TEST_KEEPA_KEY"
tokens_per_minute = 20
bucket_capacity = 60

[evaluation]
min_profit = 5.0
min_multiplier = 2.0
max_sales_rank = 1500000
stockout_drop_count = 30.0
default_weight_oz = 16.0

[evaluation.fees]
referral_rate = 0.15
closing_fee = 1.80
fba_overweight_per_lb = 0.38
fbm_base_postage = 3.65
fbm_postage_per_lb = 0.70
fbm_shipping_credit = 3.99
fba_tiers = [
    { max_oz = 16.0, fee = 3.77 },
    { max_oz = 48.0, fee = 5.40 },
]

[storage]
database_url = "sqlite::memory:"

[[searches]]
seller = "thrift_books_outlet"
query = "textbook"
category_id = "267"

[[searches]]
seller = "bookbarn"
query = "isbn"
condition_id = "3000"
pause_after_new = 500
"#;
