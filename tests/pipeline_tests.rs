//! End-to-end pipeline tests against fixture markup
//!
//! The fetcher and the selector-inference service are scripted; the pattern
//! store and the SQLite catalog are real and live in a temporary directory.

use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

use catalog_harvester::IngestionService;
use catalog_harvester::domain::repositories::CatalogStore;
use catalog_harvester::infrastructure::{
    CrawlError, DatabaseConnection, InMemoryCatalog, PatternStore, SourceRegistry, SqliteCatalogRepository,
};
use catalog_harvester::test_utils::{
    ScriptedFetcher, ScriptedInference, fast_config, listing_card, result_page, shop_source,
};

const TITLE: &str = "Acme Phone X 8GB RAM 128GB 5000mAh 5G";

fn page_url(page: u32) -> String {
    format!("https://shop.test/search?q=phone&page={page}")
}

fn queries() -> Vec<String> {
    vec!["phone".to_string()]
}

fn repair_answer() -> serde_json::Value {
    json!({
        "primary": "span.amount",
        "fallback1": "span[itemprop=price]",
        "fallback2": "",
        "explanation": "the price now renders in span.amount"
    })
}

async fn sqlite_catalog(dir: &std::path::Path) -> anyhow::Result<Arc<SqliteCatalogRepository>> {
    let url = format!("sqlite:{}", dir.join("catalog.db").display());
    let database = DatabaseConnection::new(&url).await?;
    database.migrate().await?;
    Ok(Arc::new(SqliteCatalogRepository::new(database.pool().clone())))
}

#[tokio::test]
async fn markup_drift_is_healed_persisted_and_reused() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let pattern_file = dir.path().join("patterns").join("selectors.json");
    let mut config = fast_config(vec![shop_source("shopmart")]);
    config.crawl.max_pages = 2;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond(
        &page_url(1),
        200,
        result_page(&[
            listing_card("SKU-1", TITLE, "₹14,999", "amount"),
            listing_card("SKU-2", "Acme Phone Y 12GB RAM 256GB 5G", "₹19,999", "amount"),
        ]),
    );
    fetcher.respond(
        &page_url(2),
        200,
        result_page(&[listing_card("SKU-3", "Acme Phone Z 6GB RAM 64GB 4G", "₹9,999", "amount")]),
    );
    let inference = Arc::new(ScriptedInference::answering(repair_answer()));
    let patterns = Arc::new(PatternStore::open(&pattern_file).await?);
    let catalog = sqlite_catalog(dir.path()).await?;

    let service = IngestionService::new(
        &config,
        SourceRegistry::from_configs(&config.sources),
        fetcher.clone(),
        inference.clone(),
        Arc::clone(&patterns),
        catalog.clone(),
    );
    let results = service.run_all(&queries()).await;
    let report = results[0].1.as_ref().expect("records were extracted");

    assert_eq!(report.inserted(), 3);
    // page 2 resolves with the learned selector, no second repair
    assert_eq!(inference.calls(), 1);
    assert_eq!(service.stats().snapshot().selector_repairs, 1);

    let stored = catalog.find_product("shopmart", "SKU-3").await?.expect("persisted");
    assert_eq!(stored.current_price, 9_999.0);
    assert_eq!(stored.specifications.get("connectivity").map(String::as_str), Some("4G"));

    let on_disk = PatternStore::load(&pattern_file).await?;
    let learned = &on_disk["shopmart"]["price"];
    assert_eq!(learned.selectors, vec!["span.amount", "span[itemprop=price]"]);
    assert!(learned.last_healed.is_some());
    assert!(learned.confidence > 80);
    Ok(())
}

#[tokio::test]
async fn cooling_down_field_falls_back_without_touching_patterns() -> anyhow::Result<()> {
    let mut config = fast_config(vec![shop_source("shopmart")]);
    config.crawl.max_pages = 2;

    let fetcher = Arc::new(ScriptedFetcher::new());
    // price lives where no selector looks; the title still resolves
    for page in 1..=2 {
        fetcher.respond(
            &page_url(page),
            200,
            result_page(&[listing_card(&format!("SKU-{page}"), TITLE, "₹14,999", "amount")]),
        );
    }
    let inference = Arc::new(ScriptedInference::silent());
    let patterns = Arc::new(PatternStore::in_memory(Default::default()));

    let service = IngestionService::new(
        &config,
        SourceRegistry::from_configs(&config.sources),
        fetcher,
        inference.clone(),
        Arc::clone(&patterns),
        Arc::new(InMemoryCatalog::new()),
    );
    let results = service.run_all(&queries()).await;

    // one attempt on page 1, page 2 inside the cooldown window
    assert_eq!(inference.calls(), 1);
    assert!(patterns.snapshot().is_empty());
    assert!(matches!(results[0].1, Err(CrawlError::NoRecords { pages: 2, .. })));
    let stats = service.stats().snapshot();
    assert_eq!(stats.healing_failures, 1);
    assert_eq!(stats.validation_rejections, 2);
    Ok(())
}

#[tokio::test]
async fn blocked_source_is_retried_then_reported_empty() -> anyhow::Result<()> {
    let mut config = fast_config(vec![shop_source("shopmart")]);
    config.crawl.max_pages = 5;

    let fetcher = Arc::new(ScriptedFetcher::new());
    for page in 1..=5 {
        fetcher.respond(&page_url(page), 503, result_page(&["<p>Service Unavailable</p>".to_string()]));
    }
    let service = IngestionService::new(
        &config,
        SourceRegistry::from_configs(&config.sources),
        fetcher.clone(),
        Arc::new(ScriptedInference::silent()),
        Arc::new(PatternStore::in_memory(Default::default())),
        Arc::new(InMemoryCatalog::new()),
    );

    let results = service.run_all(&queries()).await;
    assert!(matches!(results[0].1, Err(CrawlError::NoRecords { pages: 3, .. })));
    // three empty pages in a row end the run, each fetched max_fetch_attempts times
    assert_eq!(fetcher.requests().len(), 9);
    assert_eq!(service.stats().snapshot().blocked_pages, 9);
    Ok(())
}

#[tokio::test]
async fn repeated_runs_update_instead_of_duplicating() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut config = fast_config(vec![shop_source("shopmart")]);
    config.crawl.max_pages = 1;

    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond(
        &page_url(1),
        200,
        result_page(&[listing_card("SKU-1", TITLE, "₹14,999", "price")]),
    );
    let catalog = sqlite_catalog(dir.path()).await?;
    let service = IngestionService::new(
        &config,
        SourceRegistry::from_configs(&config.sources),
        fetcher,
        Arc::new(ScriptedInference::silent()),
        Arc::new(PatternStore::in_memory(Default::default())),
        catalog.clone(),
    );

    let first = service.run_source_by_name("shopmart", &queries()).await?;
    let before = catalog.find_product("shopmart", "SKU-1").await?.expect("inserted");
    let second = service.run_source_by_name("shopmart", &queries()).await?;
    let after = catalog.find_product("shopmart", "SKU-1").await?.expect("still there");

    assert_eq!((first.inserted(), first.updated()), (1, 0));
    assert_eq!((second.inserted(), second.updated()), (0, 1));
    assert_eq!(after.id, before.id);
    assert_eq!(after.review_count, before.review_count);
    assert_eq!(after.specifications, before.specifications);
    assert_eq!(after.scrape_count, 2);
    assert_eq!(catalog.count_products(None).await?, 1);
    assert_eq!(catalog.price_history(after.id.unwrap_or_default()).await?.len(), 2);
    Ok(())
}
