//! Collaborator interfaces used by the extraction pipeline
//!
//! Fetching pages, inferring selectors and per-source behaviour are all
//! consumed through these traits so the pipeline can be driven by real HTTP
//! clients in production and by scripted fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::field::FieldValue;
use crate::domain::product::CandidateRecord;
use crate::infrastructure::pipeline_error::{FetchError, InferenceError};

/// Status and body of one fetched page; nothing else of the transport is surfaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, FetchError>;
}

/// Request handed to the selector-inference service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub source: String,
    pub field: String,
    pub field_description: String,
    pub html_snippet: String,
}

#[async_trait]
pub trait SelectorInference: Send + Sync {
    /// Raw response payload. `Ok(None)` means the service answered with nothing.
    /// The payload is untrusted; the healer validates its shape.
    async fn infer_selectors(&self, request: &InferenceRequest) -> Result<Option<serde_json::Value>, InferenceError>;
}

/// Field values resolved from one listing card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    /// Identifier read from the card element's own attribute, if configured
    pub element_identifier: Option<String>,
    pub values: HashMap<&'static str, FieldValue>,
}

impl ExtractedFields {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(FieldValue::as_text)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(FieldValue::as_number)
    }

    pub fn flag(&self, field: &str) -> Option<bool> {
        self.values.get(field).and_then(FieldValue::as_flag)
    }
}

/// Per-source behaviour selected from a registry instead of subclassing
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Result page URL for `query`; pages are 1-based
    fn build_search_url(&self, query: &str, page: u32) -> String;

    /// Request headers for this source
    fn request_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Anti-automation heuristics on a fetched page
    fn is_blocked(&self, page: &FetchedPage) -> bool;

    /// Selector locating every listing card on a result page
    fn candidate_selector(&self) -> &str;

    /// Attribute on the card element carrying the product identifier
    fn identifier_attribute(&self) -> Option<&str> {
        None
    }

    /// Built-in selectors for a field, tried after the learned ones
    fn default_selectors(&self, field: &str) -> &[String];

    /// Assemble a candidate from resolved values; `None` when the card has no identity
    fn extract_candidate(&self, fields: &ExtractedFields) -> Option<CandidateRecord>;
}
