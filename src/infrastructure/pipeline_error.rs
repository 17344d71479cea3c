//! Error types for the extraction pipeline and its collaborators
//!
//! Each collaborator boundary gets its own error enum. Per-record and per-page
//! problems are classified with [`PipelineIssue`] and counted rather than
//! propagated; only [`CrawlError::NoRecords`] escalates to the caller.

use thiserror::Error;

/// Failure of the fetch collaborator
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Fetch timed out after {timeout_secs}s: {url}")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("Invalid request URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure of the selector-inference collaborator
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("Selector inference unreachable: {0}")]
    Transport(String),

    #[error("Selector inference timed out after {0}s")]
    Timeout(u64),

    #[error("Selector inference returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Selector inference payload unreadable: {0}")]
    Payload(String),

    #[error("Selector inference disabled")]
    Disabled,
}

/// Failure of the pattern store's durable document
#[derive(Error, Debug)]
pub enum PatternStoreError {
    #[error("Pattern file I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pattern file is not a valid pattern document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of the persistence collaborator for a single record
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Specification mapping could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Product {product_id} from {source_name} not found for update")]
    Missing { source_name: String, product_id: String },
}

/// Run-level failure escalated to the invoking caller
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Source '{source_name}' produced no records across {pages} page(s)")]
    NoRecords { source_name: String, pages: u32 },

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// Classification of soft failures observed during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineIssue {
    /// Record failed the quality gate; dropped
    ValidationRejection,
    /// Every selector for a field failed; fallback value used
    ExtractionMiss,
    /// Repair attempt found the inference service unreachable or its payload malformed
    HealingFailure,
    /// Anti-automation page detected; retried then skipped
    BlockedPage,
    /// Fetch error; same retry path as a blocked page
    TransportFailure,
    /// Upsert or history write failed for one record
    PersistenceFailure,
}

impl PipelineIssue {
    /// Whether the issue is retried at page level
    pub fn is_retried(self) -> bool {
        matches!(self, Self::BlockedPage | Self::TransportFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationRejection => "validation_rejection",
            Self::ExtractionMiss => "extraction_miss",
            Self::HealingFailure => "healing_failure",
            Self::BlockedPage => "blocked_page",
            Self::TransportFailure => "transport_failure",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl FetchError {
    pub fn transport(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Status { url, .. }
            | Self::Timeout { url, .. }
            | Self::InvalidUrl { url, .. } => url,
        }
    }

    /// A malformed URL or a missing page will not get better by retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidUrl { .. } => false,
            Self::Status { status, .. } => matches!(status, 408 | 425 | 429) || *status >= 500,
            Self::Transport { .. } | Self::Timeout { .. } => true,
        }
    }
}

impl InferenceError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Payload(_) | Self::Disabled => false,
        }
    }
}
