//! Infrastructure layer: configuration, logging, HTTP, markup, persistence
//! and the concrete collaborators the pipeline is wired with.

pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod markup;
pub mod memory_catalog;
pub mod pattern_store;
pub mod pipeline_error;
pub mod selector_inference_client;
pub mod source_adapters;

pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigManager, SourceConfig};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpFetcher;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use memory_catalog::InMemoryCatalog;
pub use pattern_store::PatternStore;
pub use pipeline_error::{CrawlError, FetchError, InferenceError, PatternStoreError, PersistenceError, PipelineIssue};
pub use selector_inference_client::{ChatCompletionsInference, DisabledInference};
pub use source_adapters::{ConfiguredSource, SourceRegistry};
