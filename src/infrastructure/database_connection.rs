// Database connection and pool management
// SQLite via sqlx; the schema holds the six catalog record tables

use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create database directory {:?}", parent))?;
                }
            }

            // Ensure the database file exists by creating it if necessary
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)
                    .with_context(|| format!("Failed to create database file {}", db_path))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to {}", database_url))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_categories_sql = r#"
            CREATE TABLE IF NOT EXISTS canonical_categories (
                canon_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                parent_id INTEGER REFERENCES canonical_categories (canon_id)
            )
        "#;

        let create_store_paths_sql = r#"
            CREATE TABLE IF NOT EXISTS store_category_paths (
                store_id TEXT NOT NULL,
                normalized_path TEXT NOT NULL,
                raw_path TEXT NOT NULL,
                depth INTEGER NOT NULL,
                example_url TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                occurrences INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'candidate',
                canon_id INTEGER REFERENCES canonical_categories (canon_id),
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                PRIMARY KEY (store_id, normalized_path)
            )
        "#;

        // History table: rows are only ever appended or marked superseded
        let create_mapping_sql = r#"
            CREATE TABLE IF NOT EXISTS category_mapping (
                entry_id TEXT PRIMARY KEY,
                normalized_path TEXT NOT NULL,
                canon_id INTEGER NOT NULL REFERENCES canonical_categories (canon_id),
                confidence REAL,
                approved_by TEXT NOT NULL,
                approved_at TEXT NOT NULL,
                source TEXT NOT NULL,
                note TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                superseded_by TEXT,
                superseded_at TEXT
            )
        "#;

        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS products (
                store_id TEXT NOT NULL,
                store_product_id TEXT NOT NULL,
                name TEXT,
                price REAL,
                source_url TEXT NOT NULL,
                breadcrumb_path_norm TEXT,
                resolution_state TEXT NOT NULL,
                canon_id INTEGER REFERENCES canonical_categories (canon_id),
                scraped_at TEXT NOT NULL,
                PRIMARY KEY (store_id, store_product_id),
                CHECK ((resolution_state = 'resolved') = (canon_id IS NOT NULL))
            )
        "#;

        let create_unmapped_sql = r#"
            CREATE TABLE IF NOT EXISTS unmapped_review_queue (
                normalized_path TEXT PRIMARY KEY,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                occurrence_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                example_urls TEXT NOT NULL DEFAULT '[]',
                resolved_canon_id INTEGER,
                resolved_entry_id TEXT,
                resolved_at TEXT
            )
        "#;

        let create_coverage_sql = r#"
            CREATE TABLE IF NOT EXISTS coverage_reports (
                run_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                percent_labelled REAL NOT NULL,
                total_products INTEGER NOT NULL,
                mapping_version INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                stability_json TEXT
            )
        "#;

        let create_indexes_sql = r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_mapping_active_path
                ON category_mapping (normalized_path) WHERE status = 'active';
            CREATE INDEX IF NOT EXISTS idx_mapping_approved_at ON category_mapping (approved_at);
            CREATE INDEX IF NOT EXISTS idx_products_canon_id ON products (canon_id);
            CREATE INDEX IF NOT EXISTS idx_unmapped_status ON unmapped_review_queue (status);
            CREATE INDEX IF NOT EXISTS idx_coverage_timestamp ON coverage_reports (timestamp);
        "#;

        for sql in [
            create_categories_sql,
            create_store_paths_sql,
            create_mapping_sql,
            create_products_sql,
            create_unmapped_sql,
            create_coverage_sql,
        ] {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        info!("Database schema ready");
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
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        // Idempotent
        db.migrate().await?;

        for table in [
            "canonical_categories",
            "store_category_paths",
            "category_mapping",
            "products",
            "unmapped_review_queue",
            "coverage_reports",
        ] {
            let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(result.is_some(), "missing table {table}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_single_active_mapping_per_path() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("unique.db").display());
        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        sqlx::query("INSERT INTO canonical_categories (canon_id, name) VALUES (1, 'Grocery')")
            .execute(db.pool())
            .await?;

        let insert = "INSERT INTO category_mapping (entry_id, normalized_path, canon_id, approved_by, approved_at, source, status) VALUES (?, 'grocery', 1, 'c', '2024-01-01T00:00:00Z', 'import', ?)";
        sqlx::query(insert).bind("a").bind("active").execute(db.pool()).await?;
        sqlx::query(insert).bind("b").bind("superseded").execute(db.pool()).await?;
        let duplicate = sqlx::query(insert).bind("c").bind("active").execute(db.pool()).await;
        assert!(duplicate.is_err());
        Ok(())
    }
}
