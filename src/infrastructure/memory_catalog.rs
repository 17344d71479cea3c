//! In-process catalog store for dry runs and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::product::{PriceHistorySnapshot, Product};
use crate::domain::repositories::CatalogStore;
use crate::infrastructure::pipeline_error::PersistenceError;

#[derive(Default)]
struct CatalogState {
    next_id: i64,
    products: HashMap<i64, Product>,
    keys: HashMap<(String, String), i64>,
    history: HashMap<i64, Vec<PriceHistorySnapshot>>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<_> = self.lock().products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        products
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn find_product(&self, source: &str, product_id: &str) -> Result<Option<Product>, PersistenceError> {
        let state = self.lock();
        let key = (source.to_string(), product_id.to_string());
        Ok(state.keys.get(&key).and_then(|id| state.products.get(id)).cloned())
    }

    async fn write_product(&self, product: &Product) -> Result<i64, PersistenceError> {
        let mut state = self.lock();
        let id = match product.id {
            Some(id) if state.products.contains_key(&id) => id,
            Some(_) => {
                return Err(PersistenceError::Missing {
                    source_name: product.source.clone(),
                    product_id: product.product_id.clone(),
                });
            }
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state
                    .keys
                    .insert((product.source.clone(), product.product_id.clone()), id);
                id
            }
        };
        let mut stored = product.clone();
        stored.id = Some(id);
        state.products.insert(id, stored);
        Ok(id)
    }

    async fn append_price_history(&self, id: i64, snapshot: &PriceHistorySnapshot) -> Result<(), PersistenceError> {
        self.lock().history.entry(id).or_default().push(snapshot.clone());
        Ok(())
    }

    async fn price_history(&self, id: i64) -> Result<Vec<PriceHistorySnapshot>, PersistenceError> {
        Ok(self.lock().history.get(&id).cloned().unwrap_or_default())
    }
}
