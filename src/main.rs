//! catalog-harvester command line entry point
//!
//! Usage: `catalog-harvester [CONFIG_PATH] [QUERY...]`
//!
//! Loads the configuration (default location when no path is given), runs every
//! configured source over the queries and prints a per-source summary. Ctrl-C
//! stops the run at the next page boundary.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use catalog_harvester::domain::repositories::CatalogStore;
use catalog_harvester::domain::services::SelectorInference;
use catalog_harvester::infrastructure::logging::log_system_info;
use catalog_harvester::infrastructure::{
    ChatCompletionsInference, ConfigManager, DatabaseConnection, DisabledInference, HttpFetcher, InMemoryCatalog,
    PatternStore, SourceRegistry, SqliteCatalogRepository, init_logging_with_config,
};
use catalog_harvester::IngestionService;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let manager = match args.next() {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let queries: Vec<String> = args.collect();

    let config = manager.load_config().await?;
    config.validate().context("Invalid configuration")?;

    init_logging_with_config(config.logging.clone())?;
    log_system_info();
    info!("Configuration: {:?}", manager.config_path());

    if config.sources.is_empty() {
        warn!("No sources configured in {:?}; nothing to do", manager.config_path());
        return Ok(());
    }
    if queries.is_empty() {
        anyhow::bail!("usage: catalog-harvester [CONFIG_PATH] QUERY [QUERY...]");
    }

    let catalog: Arc<dyn CatalogStore> = match &config.storage.database_url {
        Some(url) => {
            let database = DatabaseConnection::new(url).await?;
            database.migrate().await?;
            info!("Catalog database: {}", url);
            Arc::new(SqliteCatalogRepository::new(database.pool().clone()))
        }
        None => {
            warn!("No database_url configured; results are kept in memory only");
            Arc::new(InMemoryCatalog::new())
        }
    };

    let patterns = Arc::new(PatternStore::open(&config.storage.pattern_file).await?);
    let inference: Arc<dyn SelectorInference> = if config.inference.enabled {
        Arc::new(ChatCompletionsInference::new(
            config.inference.clone(),
            config.healing.inference_timeout(),
        )?)
    } else {
        info!("Selector inference disabled; missing fields will not be repaired");
        Arc::new(DisabledInference)
    };
    let fetcher = Arc::new(HttpFetcher::new(config.http.clone())?);

    let service = IngestionService::new(
        &config,
        SourceRegistry::from_configs(&config.sources),
        fetcher,
        inference,
        Arc::clone(&patterns),
        catalog,
    );

    info!("Run id: {}", service.run_id());
    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current page");
            cancel.cancel();
        }
    });

    let results = service.run_all(&queries).await;
    if let Err(e) = patterns.save().await {
        error!("Failed to save learned selectors: {}", e);
    }

    let mut failed_sources = 0usize;
    for (source, result) in &results {
        match result {
            Ok(report) => println!(
                "{source}: {} accepted, {} inserted, {} updated, {} failed over {} page(s)",
                report.accepted(),
                report.inserted(),
                report.updated(),
                report.persistence_failures(),
                report.pages_visited()
            ),
            Err(e) => {
                failed_sources += 1;
                println!("{source}: {e}");
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&service.stats().snapshot())?);

    if failed_sources == results.len() {
        anyhow::bail!("every source failed to produce records");
    }
    Ok(())
}
