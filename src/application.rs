//! Application layer
//!
//! The stateful pipeline built on the domain rules: selector resolution,
//! healing, page orchestration, multi-page crawling, reconciliation and
//! multi-source ingestion.

pub mod crawl_driver;
pub mod healer;
pub mod ingestion;
pub mod page_orchestrator;
pub mod reconciler;
pub mod run_stats;
pub mod selector_resolver;

pub use crawl_driver::{CrawlDriver, CrawlOutcome, CrawlPlan, StopReason};
pub use healer::{HealOutcome, HealerSettings, SelectorHealer, SelectorProposal};
pub use ingestion::{IngestReport, IngestionService, QueryReport};
pub use page_orchestrator::{PageOrchestrator, PageResult};
pub use reconciler::{Reconciler, merge_product, new_product};
pub use run_stats::{RunStats, RunStatsSnapshot};
pub use selector_resolver::{FieldResolution, ResolutionOutcome, SelectorResolver};
