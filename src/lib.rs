//! catalog-harvester - adaptive product listing extraction
//!
//! Extracts product listings from e-commerce result pages with a learned,
//! self-repairing selector registry, gates them through validation and quality
//! scoring, and reconciles them into a catalog with price history.

pub mod application;
pub mod domain;
pub mod infrastructure;

#[doc(hidden)]
pub mod test_utils;

pub use application::{IngestReport, IngestionService, RunStats};
pub use domain::{CandidateRecord, Product, ValidatedProduct};
pub use infrastructure::{AppConfig, ConfigManager, PatternStore, SourceRegistry};
