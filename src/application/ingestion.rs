//! Multi-source ingestion
//!
//! Every registered source runs as its own pipeline: its queries are crawled
//! one after another and accepted records are reconciled into the shared
//! catalog. Sources run concurrently and share only the pattern store and the
//! catalog. A source that yields no records at all is the one hard failure.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::crawl_driver::{CrawlDriver, CrawlPlan, StopReason};
use crate::application::healer::{HealerSettings, SelectorHealer};
use crate::application::page_orchestrator::PageOrchestrator;
use crate::application::reconciler::Reconciler;
use crate::application::run_stats::RunStats;
use crate::application::selector_resolver::SelectorResolver;
use crate::domain::repositories::CatalogStore;
use crate::domain::services::{PageFetcher, SelectorInference, SourceAdapter};
use crate::infrastructure::config::{AppConfig, CrawlConfig};
use crate::infrastructure::pattern_store::PatternStore;
use crate::infrastructure::pipeline_error::{CrawlError, PipelineIssue};
use crate::infrastructure::source_adapters::SourceRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub pages_visited: u32,
    pub stop_reason: StopReason,
    pub accepted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub persistence_failures: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub queries: Vec<QueryReport>,
}

impl IngestReport {
    pub fn accepted(&self) -> usize {
        self.queries.iter().map(|q| q.accepted).sum()
    }

    pub fn inserted(&self) -> usize {
        self.queries.iter().map(|q| q.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.queries.iter().map(|q| q.updated).sum()
    }

    pub fn persistence_failures(&self) -> usize {
        self.queries.iter().map(|q| q.persistence_failures).sum()
    }

    pub fn pages_visited(&self) -> u32 {
        self.queries.iter().map(|q| q.pages_visited).sum()
    }
}

pub struct IngestionService {
    registry: SourceRegistry,
    driver: CrawlDriver,
    reconciler: Reconciler,
    stats: Arc<RunStats>,
    crawl: CrawlConfig,
    cancel: CancellationToken,
    run_id: Uuid,
}

impl IngestionService {
    /// Wire the pipeline around the given collaborators
    pub fn new(
        config: &AppConfig,
        registry: SourceRegistry,
        fetcher: Arc<dyn PageFetcher>,
        inference: Arc<dyn SelectorInference>,
        patterns: Arc<PatternStore>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        let stats = Arc::new(RunStats::new());
        let healer = Arc::new(SelectorHealer::new(
            Arc::clone(&patterns),
            inference,
            HealerSettings::from(&config.healing),
        ));
        let orchestrator = Arc::new(PageOrchestrator::new(
            fetcher,
            SelectorResolver::new(Arc::clone(&patterns)),
            healer,
            Arc::clone(&stats),
            config.crawl.clone(),
        ));
        Self {
            registry,
            driver: CrawlDriver::new(orchestrator, patterns, config.crawl.clone()),
            reconciler: Reconciler::new(catalog),
            stats,
            crawl: config.crawl.clone(),
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    /// Token that stops every source at its next page boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Identifier attached to every log line of this service's runs
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run every registered source over `queries`, concurrently across sources
    pub async fn run_all(&self, queries: &[String]) -> Vec<(String, Result<IngestReport, CrawlError>)> {
        let sources = self.registry.all();
        let span = info_span!("ingest", run_id = %self.run_id);
        async {
            info!("🚀 Ingesting {} quer(ies) from {} source(s)", queries.len(), sources.len());
            let runs = sources.iter().map(|source| async move {
                let name = source.name().to_string();
                let result = self.run_source(source.as_ref(), queries).await;
                (name, result)
            });
            join_all(runs).await
        }
        .instrument(span)
        .await
    }

    pub async fn run_source_by_name(&self, name: &str, queries: &[String]) -> Result<IngestReport, CrawlError> {
        let source = self.registry.get(name)?;
        self.run_source(source.as_ref(), queries).await
    }

    /// Crawl and reconcile each query in turn for one source
    pub async fn run_source(&self, source: &dyn SourceAdapter, queries: &[String]) -> Result<IngestReport, CrawlError> {
        let mut report = IngestReport {
            source: source.name().to_string(),
            queries: Vec::with_capacity(queries.len()),
        };

        for query in queries {
            if self.cancel.is_cancelled() {
                break;
            }
            let plan = CrawlPlan::from_config(query.clone(), &self.crawl);
            let outcome = self.driver.run(source, &plan, &self.cancel).await;

            let mut query_report = QueryReport {
                query: query.clone(),
                pages_visited: outcome.pages_visited,
                stop_reason: outcome.stop_reason,
                accepted: outcome.records.len(),
                inserted: 0,
                updated: 0,
                persistence_failures: 0,
            };
            for record in &outcome.records {
                match self.reconciler.upsert(record).await {
                    Ok(upsert) if upsert.is_new => query_report.inserted += 1,
                    Ok(_) => query_report.updated += 1,
                    Err(e) => {
                        error!("Failed to persist {}/{}: {}", record.source, record.product_id, e);
                        self.stats.record(PipelineIssue::PersistenceFailure);
                        query_report.persistence_failures += 1;
                        continue;
                    }
                }
                self.stats.record_persisted();
            }
            report.queries.push(query_report);
        }

        let pages = report.pages_visited();
        if report.accepted() == 0 {
            if self.cancel.is_cancelled() && pages == 0 {
                info!("{} cancelled before any page was fetched", report.source);
                return Ok(report);
            }
            warn!("{} produced no records across {} page(s)", report.source, pages);
            return Err(CrawlError::NoRecords {
                source_name: report.source,
                pages,
            });
        }

        info!(
            "✅ {}: {} accepted, {} inserted, {} updated, {} failed",
            report.source,
            report.accepted(),
            report.inserted(),
            report.updated(),
            report.persistence_failures()
        );
        Ok(report)
    }
}
