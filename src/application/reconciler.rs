//! Catalog reconciliation
//!
//! Each validated record is merged into the stored product under a
//! non-destructive policy and followed by exactly one price-history snapshot.
//! Read-merge-write for one `(source, product_id)` is serialized in process;
//! different keys proceed concurrently.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::domain::product::{Product, UpsertOutcome, ValidatedProduct};
use crate::domain::repositories::CatalogStore;
use crate::infrastructure::pipeline_error::PersistenceError;

type ProductKey = (String, String);

/// Stored product after observing `incoming`
pub fn merge_product(stored: Product, incoming: &ValidatedProduct, now: DateTime<Utc>) -> Product {
    let specifications = if incoming.specifications.is_empty() {
        stored.specifications
    } else {
        incoming.specifications.clone()
    };

    Product {
        id: stored.id,
        source: stored.source,
        product_id: stored.product_id,
        title: incoming.title.clone(),
        brand: incoming.brand.clone(),
        category: incoming.category.clone(),
        subcategory: incoming.subcategory.clone().or(stored.subcategory),
        image_url: incoming.image_url.clone().or(stored.image_url),
        url: incoming.url.clone().or(stored.url),
        current_price: incoming.current_price,
        original_price: incoming.original_price,
        discount_percent: incoming.discount_percent,
        available: incoming.available,
        rating: incoming.rating.or(stored.rating),
        review_count: stored.review_count.max(incoming.review_count),
        specifications,
        quality_score: incoming.quality_score,
        scrape_count: stored.scrape_count + 1,
        first_seen: stored.first_seen,
        last_updated: now,
    }
}

/// First catalog entry for a record
pub fn new_product(incoming: &ValidatedProduct, now: DateTime<Utc>) -> Product {
    Product {
        id: None,
        source: incoming.source.clone(),
        product_id: incoming.product_id.clone(),
        title: incoming.title.clone(),
        brand: incoming.brand.clone(),
        category: incoming.category.clone(),
        subcategory: incoming.subcategory.clone(),
        image_url: incoming.image_url.clone(),
        url: incoming.url.clone(),
        current_price: incoming.current_price,
        original_price: incoming.original_price,
        discount_percent: incoming.discount_percent,
        available: incoming.available,
        rating: incoming.rating,
        review_count: incoming.review_count,
        specifications: incoming.specifications.clone(),
        quality_score: incoming.quality_score,
        scrape_count: 1,
        first_seen: now,
        last_updated: now,
    }
}

pub struct Reconciler {
    catalog: Arc<dyn CatalogStore>,
    key_locks: Mutex<HashMap<ProductKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    /// Insert or merge `record`, then append its price snapshot
    pub async fn upsert(&self, record: &ValidatedProduct) -> Result<UpsertOutcome, PersistenceError> {
        let key = record.key();
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            self.write(record).await
        };
        self.release(&key, lock);
        result
    }

    async fn write(&self, record: &ValidatedProduct) -> Result<UpsertOutcome, PersistenceError> {
        let now = Utc::now();
        let existing = self.catalog.find_product(&record.source, &record.product_id).await?;
        let is_new = existing.is_none();
        let product = match existing {
            Some(stored) => merge_product(stored, record, now),
            None => new_product(record, now),
        };

        let id = self.catalog.write_product(&product).await?;
        self.catalog.append_price_history(id, &record.price_snapshot(now)).await?;
        debug!(
            "{} {}/{} (id {}, scrape #{})",
            if is_new { "Inserted" } else { "Updated" },
            record.source,
            record.product_id,
            id,
            product.scrape_count
        );
        Ok(UpsertOutcome { id, is_new })
    }

    fn lock_for(&self, key: &ProductKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the key's lock once no other upsert holds or awaits it
    fn release(&self, key: &ProductKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
