//! Domain services
//!
//! Pure rules (title attribute inference, validation and quality scoring) and
//! the collaborator interfaces the pipeline is written against.

pub mod crawling_services;
pub mod title_inference;
pub mod validation;

pub use crawling_services::{
    ExtractedFields, FetchedPage, InferenceRequest, PageFetcher, SelectorInference, SourceAdapter,
};
pub use title_inference::infer_attributes;
pub use validation::{ValidationRejection, normalize_candidate, quality_score};
