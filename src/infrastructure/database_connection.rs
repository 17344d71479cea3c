// Database connection and schema for the product catalog
// SQLite through sqlx; products are unique per (source, product_id)

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        if !in_memory {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every pooled connection to :memory: would be its own database
        let max_connections = if in_memory { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                product_id TEXT NOT NULL,
                title TEXT NOT NULL,
                brand TEXT,
                category TEXT,
                subcategory TEXT,
                image_url TEXT,
                url TEXT,
                current_price REAL NOT NULL,
                original_price REAL NOT NULL,
                discount_percent INTEGER NOT NULL DEFAULT 0,
                available BOOLEAN NOT NULL DEFAULT 1,
                rating REAL,
                review_count INTEGER NOT NULL DEFAULT 0,
                specifications TEXT NOT NULL DEFAULT '{}',
                quality_score INTEGER NOT NULL DEFAULT 0,
                scrape_count INTEGER NOT NULL DEFAULT 1,
                first_seen DATETIME NOT NULL,
                last_updated DATETIME NOT NULL,
                UNIQUE (source, product_id)
            )
        "#;

        let create_price_history_sql = r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_ref INTEGER NOT NULL,
                price REAL NOT NULL,
                original_price REAL NOT NULL,
                discount_percent INTEGER NOT NULL,
                available BOOLEAN NOT NULL,
                recorded_at DATETIME NOT NULL,
                FOREIGN KEY (product_ref) REFERENCES products (id) ON DELETE CASCADE
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_products_source ON products (source)",
            "CREATE INDEX IF NOT EXISTS idx_products_last_updated ON products (last_updated)",
            "CREATE INDEX IF NOT EXISTS idx_price_history_product ON price_history (product_ref, recorded_at)",
        ];

        sqlx::query(create_products_sql).execute(&self.pool).await?;
        sqlx::query(create_price_history_sql).execute(&self.pool).await?;
        for statement in create_indexes_sql {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("catalog.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        // idempotent
        db.migrate().await?;

        for table in ["products", "price_history"] {
            let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(result.is_some(), "missing table {table}");
        }
        Ok(())
    }
}
