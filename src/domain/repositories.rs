//! Repository interfaces for the product catalog
//!
//! The reconciler owns the merge policy; a store only reads and writes rows.

use async_trait::async_trait;

use crate::domain::product::{PriceHistorySnapshot, Product};
use crate::infrastructure::pipeline_error::PersistenceError;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Stored product for `(source, product_id)`, if any
    async fn find_product(&self, source: &str, product_id: &str) -> Result<Option<Product>, PersistenceError>;

    /// Insert (`product.id == None`) or overwrite the product; returns its catalog id
    async fn write_product(&self, product: &Product) -> Result<i64, PersistenceError>;

    /// Append one price-history row for the catalog id
    async fn append_price_history(&self, id: i64, snapshot: &PriceHistorySnapshot) -> Result<(), PersistenceError>;

    /// Full history for the catalog id, oldest first
    async fn price_history(&self, id: i64) -> Result<Vec<PriceHistorySnapshot>, PersistenceError>;
}
