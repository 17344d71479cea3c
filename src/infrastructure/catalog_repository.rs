//! SQLite implementation of the catalog store
//!
//! Rows only; the merge policy lives in the reconciler.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::product::{PriceHistorySnapshot, Product, Specifications};
use crate::domain::repositories::CatalogStore;
use crate::infrastructure::pipeline_error::PersistenceError;

const PRODUCT_COLUMNS: &str = "id, source, product_id, title, brand, category, subcategory, image_url, url, \
     current_price, original_price, discount_percent, available, rating, review_count, specifications, \
     quality_score, scrape_count, first_seen, last_updated";

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn count_products(&self, source: Option<&str>) -> Result<i64, PersistenceError> {
        let count: i64 = match source {
            Some(source) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE source = ?")
                    .bind(source)
                    .fetch_one(&*self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM products")
                    .fetch_one(&*self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Products of one source, most recently updated first
    pub async fn list_products(&self, source: &str, limit: i64) -> Result<Vec<Product>, PersistenceError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE source = ? ORDER BY last_updated DESC LIMIT ?"
        ))
        .bind(source)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product, PersistenceError> {
    let specifications: String = row.try_get("specifications")?;
    let specifications: Specifications = serde_json::from_str(&specifications)?;
    Ok(Product {
        id: Some(row.try_get("id")?),
        source: row.try_get("source")?,
        product_id: row.try_get("product_id")?,
        title: row.try_get("title")?,
        brand: row.try_get("brand")?,
        category: row.try_get("category")?,
        subcategory: row.try_get("subcategory")?,
        image_url: row.try_get("image_url")?,
        url: row.try_get("url")?,
        current_price: row.try_get("current_price")?,
        original_price: row.try_get("original_price")?,
        discount_percent: row.try_get("discount_percent")?,
        available: row.try_get("available")?,
        rating: row.try_get("rating")?,
        review_count: row.try_get("review_count")?,
        specifications,
        quality_score: row.try_get("quality_score")?,
        scrape_count: row.try_get("scrape_count")?,
        first_seen: row.try_get("first_seen")?,
        last_updated: row.try_get("last_updated")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalogRepository {
    async fn find_product(&self, source: &str, product_id: &str) -> Result<Option<Product>, PersistenceError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE source = ? AND product_id = ?"
        ))
        .bind(source)
        .bind(product_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn write_product(&self, product: &Product) -> Result<i64, PersistenceError> {
        let specifications = serde_json::to_string(&product.specifications)?;

        let Some(id) = product.id else {
            let result = sqlx::query(
                r#"
                INSERT INTO products
                (source, product_id, title, brand, category, subcategory, image_url, url,
                 current_price, original_price, discount_percent, available, rating, review_count,
                 specifications, quality_score, scrape_count, first_seen, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&product.source)
            .bind(&product.product_id)
            .bind(&product.title)
            .bind(&product.brand)
            .bind(&product.category)
            .bind(&product.subcategory)
            .bind(&product.image_url)
            .bind(&product.url)
            .bind(product.current_price)
            .bind(product.original_price)
            .bind(product.discount_percent)
            .bind(product.available)
            .bind(product.rating)
            .bind(product.review_count)
            .bind(&specifications)
            .bind(product.quality_score)
            .bind(product.scrape_count)
            .bind(product.first_seen)
            .bind(product.last_updated)
            .execute(&*self.pool)
            .await?;
            return Ok(result.last_insert_rowid());
        };

        let result = sqlx::query(
            r#"
            UPDATE products SET
                title = ?, brand = ?, category = ?, subcategory = ?, image_url = ?, url = ?,
                current_price = ?, original_price = ?, discount_percent = ?, available = ?,
                rating = ?, review_count = ?, specifications = ?, quality_score = ?,
                scrape_count = ?, last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.title)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.image_url)
        .bind(&product.url)
        .bind(product.current_price)
        .bind(product.original_price)
        .bind(product.discount_percent)
        .bind(product.available)
        .bind(product.rating)
        .bind(product.review_count)
        .bind(&specifications)
        .bind(product.quality_score)
        .bind(product.scrape_count)
        .bind(product.last_updated)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::Missing {
                source_name: product.source.clone(),
                product_id: product.product_id.clone(),
            });
        }
        Ok(id)
    }

    async fn append_price_history(&self, id: i64, snapshot: &PriceHistorySnapshot) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO price_history (product_ref, price, original_price, discount_percent, available, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(snapshot.price)
        .bind(snapshot.original_price)
        .bind(snapshot.discount_percent)
        .bind(snapshot.available)
        .bind(snapshot.recorded_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn price_history(&self, id: i64) -> Result<Vec<PriceHistorySnapshot>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT price, original_price, discount_percent, available, recorded_at
            FROM price_history WHERE product_ref = ? ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PriceHistorySnapshot {
                    price: row.try_get("price")?,
                    original_price: row.try_get("original_price")?,
                    discount_percent: row.try_get("discount_percent")?,
                    available: row.try_get("available")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }
}
