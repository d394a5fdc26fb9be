//! End-to-end runs: configured searches crawled into an in-memory catalog,
//! then pending entries evaluated against the mock valuation service.

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use flipscout::config::AppConfig;
    use flipscout::engine::report::{RunReport, SearchStatus};
    use flipscout::engine::runner::Runner;
    use flipscout::storage::sqlite::SqliteStore;
    use flipscout::storage::{CatalogStore, CheckpointStore};
    use flipscout::types::{Decision, EvaluationResult, Search};

    use crate::mock_marketplace::{book, inventory, MockMarketplace};
    use crate::mock_valuation::{marginal_seller, steady_seller, MockValuation};

    const CONFIG: &str = r#"
[run]
name = "integration"
lookup_delay_ms = 0

[marketplace]
base_url = "http://mock.invalid"
token_env = "UNUSED_TOKEN"
page_size = 3

[valuation]
base_url = "http://mock.invalid"
api_key_env = "UNUSED_KEY"
tokens_per_minute = 1000
bucket_capacity = 1000

[evaluation]
min_profit = 5.0
min_multiplier = 2.5
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
fba_tiers = [{ max_oz = 16.0, fee = 3.77 }, { max_oz = 48.0, fee = 5.40 }]

[storage]
database_url = "sqlite::memory:"
pending_page_size = 2

[[searches]]
seller = "bookbarn"
query = "textbook"
"#;

    fn config() -> AppConfig {
        AppConfig::parse(CONFIG).unwrap()
    }

    fn search(seller: &str) -> Search {
        Search {
            seller: seller.to_string(),
            query: "textbook".to_string(),
            category_id: None,
            condition_id: None,
            pause_after_new: None,
        }
    }

    async fn stored_keys(store: &SqliteStore) -> Vec<String> {
        let mut keys = store.catalog_keys().await.unwrap();
        keys.sort();
        keys
    }

    async fn offset(store: &SqliteStore, seller: &str) -> Option<u64> {
        store
            .load_checkpoint(seller, "textbook")
            .await
            .unwrap()
            .map(|cp| cp.last_offset)
    }

    fn crawled(report: &RunReport, i: usize) -> &flipscout::engine::scanner::ScrapeReport {
        match &report.searches[i].status {
            SearchStatus::Crawled(r) => r,
            other => panic!("expected crawled search, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resume_after_failure_matches_uninterrupted_crawl() {
        let cfg = config();
        let valuation = MockValuation::new();

        // Uninterrupted reference crawl.
        let reference = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(inventory("bookbarn", 10));
        let mut report = RunReport::new(Uuid::new_v4());
        Runner::new(&reference, &market, &valuation, &cfg)
            .scrape_all(&mut report)
            .await
            .unwrap();

        // Same inventory, connection drops at offset 6.
        let store = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(inventory("bookbarn", 10));
        market.fail_at_offset(6);
        let runner = Runner::new(&store, &market, &valuation, &cfg);

        let mut first = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut first).await.unwrap();
        assert!(matches!(first.searches[0].status, SearchStatus::Failed(_)));
        assert_eq!(offset(&store, "bookbarn").await, Some(6));

        market.clear_errors();
        market.clear_requests();
        let mut second = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut second).await.unwrap();

        assert_eq!(market.offsets(), vec![6, 9]);
        assert!(crawled(&second, 0).completed);
        assert_eq!(stored_keys(&store).await, stored_keys(&reference).await);
        assert_eq!(stored_keys(&store).await.len(), 10);
    }

    #[tokio::test]
    async fn test_checkpoint_reset_only_on_completion() {
        let mut cfg = config();
        cfg.searches[0].pause_after_new = Some(3);
        let store = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(inventory("bookbarn", 8));
        let valuation = MockValuation::new();
        let runner = Runner::new(&store, &market, &valuation, &cfg);

        let mut report = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut report).await.unwrap();
        assert!(crawled(&report, 0).paused);
        assert_eq!(offset(&store, "bookbarn").await, Some(3));

        let mut report = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut report).await.unwrap();
        assert!(crawled(&report, 0).paused);
        assert_eq!(offset(&store, "bookbarn").await, Some(6));

        // Last page is short: crawl completes and the checkpoint starts over.
        let mut report = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut report).await.unwrap();
        let last = crawled(&report, 0);
        assert!(last.completed);
        assert_eq!(last.inserted, 2);
        assert_eq!(offset(&store, "bookbarn").await, Some(0));
        assert_eq!(store.count_entries().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_known_keys_never_reinserted() {
        let cfg = config();
        let store = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(inventory("bookbarn", 5));
        let valuation = MockValuation::new();
        let runner = Runner::new(&store, &market, &valuation, &cfg);

        let mut report = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut report).await.unwrap();
        assert_eq!(crawled(&report, 0).inserted, 5);

        // Decide one entry, then crawl everything again from 0.
        store
            .apply_evaluation(
                "bookbarn-0002",
                &EvaluationResult::no_data("no Keepa data"),
                chrono::Utc::now(),
            )
            .await
            .unwrap();

        let mut report = RunReport::new(Uuid::new_v4());
        runner.scrape_all(&mut report).await.unwrap();
        let again = crawled(&report, 0);
        assert_eq!(again.inserted, 0);
        assert_eq!(again.already_known, 5);
        assert_eq!(again.duplicates, 0);

        let entry = store.get_entry("bookbarn-0002").await.unwrap().unwrap();
        assert_eq!(entry.decision, Some(Decision::Reject));
    }

    #[tokio::test]
    async fn test_failed_search_does_not_stop_run() {
        let mut cfg = config();
        cfg.searches = vec![search("flaky"), search("bookbarn")];
        let store = SqliteStore::in_memory().await.unwrap();
        let mut stock = inventory("flaky", 4);
        stock.extend(inventory("bookbarn", 4));
        let market = MockMarketplace::new(stock);
        market.fail_seller("flaky");
        let valuation = MockValuation::new();

        let report = Runner::new(&store, &market, &valuation, &cfg)
            .run(Uuid::new_v4())
            .await
            .unwrap();

        assert!(matches!(report.searches[0].status, SearchStatus::Failed(_)));
        assert_eq!(crawled(&report, 1).inserted, 4);
        assert_eq!(report.failed_searches(), 1);
        assert_eq!(offset(&store, "flaky").await, None);
        assert_eq!(report.evaluation.evaluated, 4);
    }

    #[tokio::test]
    async fn test_full_run_decisions() {
        let cfg = config();
        let store = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(vec![
            book("bookbarn", Some("bookbarn-buy"), 0),
            book("bookbarn", None, 1),
            book("bookbarn", Some("bookbarn-review"), 2),
            book("bookbarn", Some("bookbarn-unknown"), 3),
        ]);
        let valuation = MockValuation::new()
            .with_product("bookbarn-buy", steady_seller())
            .with_product("bookbarn-review", marginal_seller());

        let report = Runner::new(&store, &market, &valuation, &cfg)
            .run(Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(report.total_scraped(), 4);
        assert_eq!(report.total_inserted(), 3);
        assert_eq!(report.evaluation.evaluated, 3);
        assert_eq!(report.evaluation.buy, 1);
        assert_eq!(report.evaluation.review, 1);
        assert_eq!(report.evaluation.reject, 1);
        assert!(report.finished_at.is_some());

        // Lookups follow scrape order.
        assert_eq!(
            valuation.lookups(),
            vec!["bookbarn-buy", "bookbarn-review", "bookbarn-unknown"]
        );

        let buy = store.get_entry("bookbarn-buy").await.unwrap().unwrap();
        assert_eq!(buy.decision, Some(Decision::Buy));
        assert_eq!(buy.valuation.multiplier, Some(3.08));
        assert_eq!(buy.valuation.estimated_resale_cents, Some(4000));
        assert!(buy.evaluated_at.is_some());

        let review = store.get_entry("bookbarn-review").await.unwrap().unwrap();
        assert_eq!(review.decision, Some(Decision::Review));

        let unknown = store.get_entry("bookbarn-unknown").await.unwrap().unwrap();
        assert_eq!(unknown.decision, Some(Decision::Reject));
        assert_eq!(unknown.reason.as_deref(), Some("no Keepa data"));
        assert!(unknown.valuation.external_id.is_none());
        assert!(unknown.valuation.fba_profit_cents.is_none());
        assert!(unknown.valuation.sales_rank.is_none());
    }

    #[tokio::test]
    async fn test_valuation_outage_rejects_with_reason() {
        let cfg = config();
        let store = SqliteStore::in_memory().await.unwrap();
        let market = MockMarketplace::new(inventory("bookbarn", 2));
        let valuation = MockValuation::new().with_product("bookbarn-0000", steady_seller());
        valuation.set_error("HTTP 429 too many requests");

        let report = Runner::new(&store, &market, &valuation, &cfg)
            .run(Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(report.evaluation.lookup_failures, 2);
        assert_eq!(report.evaluation.reject, 2);
        let entry = store.get_entry("bookbarn-0000").await.unwrap().unwrap();
        assert_eq!(
            entry.reason.as_deref(),
            Some("valuation lookup failed: HTTP 429 too many requests")
        );
    }

    #[tokio::test]
    async fn test_pending_seller_filter() {
        let mut cfg = config();
        cfg.searches = vec![search("alpha"), search("beta")];
        cfg.run.pending_seller = Some("beta".to_string());
        let store = SqliteStore::in_memory().await.unwrap();
        let mut stock = inventory("alpha", 2);
        stock.extend(inventory("beta", 2));
        let market = MockMarketplace::new(stock);
        let valuation = MockValuation::new();

        let report = Runner::new(&store, &market, &valuation, &cfg)
            .run(Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(report.total_inserted(), 4);
        assert_eq!(valuation.lookups(), vec!["beta-0000", "beta-0001"]);
        let alpha = store.get_entry("alpha-0000").await.unwrap().unwrap();
        assert!(alpha.is_pending());
    }
}
