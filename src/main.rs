//! FlipScout: marketplace book crawler and resale arbitrage evaluator.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves credentials, opens the catalog, and runs one crawl → evaluate
//! pass.
//!
//! Usage:
//!   flipscout                 run every configured search, then evaluate
//!   flipscout bought <isbn>   mark a catalog entry as bought

use anyhow::{bail, Result};
use tracing::{info, Instrument};
use uuid::Uuid;

use flipscout::config::AppConfig;
use flipscout::engine::runner::{self, Runner};
use flipscout::marketplace::ebay::EbayClient;
use flipscout::storage::sqlite::SqliteStore;
use flipscout::valuation::keepa::KeepaClient;

const BANNER: &str = r#"
  FLIPSCOUT  v0.1.0
  listings in, arbitrage decisions out
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::default_path();
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => run(&cfg).await,
        [cmd, isbn] if cmd == "bought" => {
            let store = SqliteStore::connect(&cfg.storage.database_url).await?;
            runner::mark_bought(&store, isbn).await?;
            Ok(())
        }
        _ => bail!("usage: flipscout [bought <isbn>]"),
    }
}

async fn run(cfg: &AppConfig) -> Result<()> {
    // Fail on missing secrets before touching the network or the database.
    let creds = cfg.credentials()?;

    println!("{BANNER}");
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id, name = %cfg.run.name);

    async move {
        info!(
            searches = cfg.searches.len(),
            page_size = cfg.marketplace.page_size,
            tokens_per_minute = cfg.valuation.tokens_per_minute,
            database = %cfg.storage.database_url,
            "FlipScout starting"
        );

        let store = SqliteStore::connect(&cfg.storage.database_url).await?;
        let ebay = EbayClient::new(creds.marketplace_token, &cfg.marketplace)?;
        let keepa = KeepaClient::new(creds.valuation_key, &cfg.valuation)?;

        let report = Runner::new(&store, &ebay, &keepa, cfg).run(run_id).await?;
        report.log_summary();
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flipscout=info"));

    let json_logging = std::env::var("FLIPSCOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
