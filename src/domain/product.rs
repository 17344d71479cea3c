use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute mapping attached to a product (e.g. `ram -> 8GB`)
pub type Specifications = BTreeMap<String, String>;

/// Raw values pulled from one listing card, before validation.
/// Any of the numeric fields may be missing, NaN or out of range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub source: String,
    pub product_id: String,
    pub title: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount_percent: Option<f64>,
    pub available: bool,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    /// Anything but a JSON object is treated as "no specifications"
    pub specifications: Option<serde_json::Value>,
}

/// A record that passed the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedProduct {
    pub source: String,
    pub product_id: String,
    pub title: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub current_price: f64,
    pub original_price: f64,
    pub discount_percent: i32,
    pub available: bool,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub specifications: Specifications,
    pub quality_score: i32,
}

/// Catalog entry, unique per `(source, product_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog row id; `None` until first written
    pub id: Option<i64>,
    pub source: String,
    pub product_id: String,
    pub title: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub current_price: f64,
    pub original_price: f64,
    pub discount_percent: i32,
    pub available: bool,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub specifications: Specifications,
    pub quality_score: i32,
    pub scrape_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Immutable price/availability observation appended on every successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistorySnapshot {
    pub price: f64,
    pub original_price: f64,
    pub discount_percent: i32,
    pub available: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Result of reconciling one record into the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub id: i64,
    pub is_new: bool,
}

impl ValidatedProduct {
    pub fn key(&self) -> (String, String) {
        (self.source.clone(), self.product_id.clone())
    }

    pub fn price_snapshot(&self, recorded_at: DateTime<Utc>) -> PriceHistorySnapshot {
        PriceHistorySnapshot {
            price: self.current_price,
            original_price: self.original_price,
            discount_percent: self.discount_percent,
            available: self.available,
            recorded_at,
        }
    }
}
