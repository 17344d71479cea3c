//! Domain layer
//!
//! Plain data (field catalogue, learned patterns, records and products), the
//! collaborator interfaces the pipeline consumes, and the pure rules that need
//! no I/O: title attribute inference and validation.

pub mod constants;
pub mod field;
pub mod markup;
pub mod pattern;
pub mod product;
pub mod repositories;
pub mod services;

pub use field::{FieldKind, FieldSpec, FieldValue, LISTING_FIELDS};
pub use markup::MarkupElement;
pub use pattern::{FieldKey, FieldPattern, PatternDocument};
pub use product::{CandidateRecord, PriceHistorySnapshot, Product, Specifications, UpsertOutcome, ValidatedProduct};
pub use repositories::CatalogStore;
