//! SQLite implementations of the catalog repository ports
//!
//! Timestamps are stored as RFC 3339 text, normalized paths by their key.
//! Coverage snapshots are kept whole as a JSON column.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::domain::breadcrumb::BreadcrumbSourceKind;
use crate::domain::canonical::{CanonId, CanonicalCategory, CanonicalTaxonomy};
use crate::domain::category_paths::{CandidateStatus, StoreCategoryPath};
use crate::domain::coverage::{CoverageReport, CoverageSnapshot};
use crate::domain::mapping::{ApprovalSource, MappingEntry, MappingStatus, Provenance};
use crate::domain::product::{Product, ResolutionState, UnmappedReason};
use crate::domain::repositories::{
    CategoryPathRepository, CoverageRepository, MappingRepository, ProductRepository,
    TaxonomyRepository, UnmappedRecordRepository,
};
use crate::domain::services::breadcrumb_normalizer::from_key;
use crate::domain::unmapped::{RecordResolution, ReviewStatus, UnmappedRecord};

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to parse {}: {}", column, e))
}

fn parse_optional_time(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| anyhow!("Failed to parse {}: {}", column, e))
    })
    .transpose()
}

fn canon_id_from(raw: i64) -> Result<CanonId> {
    u16::try_from(raw)
        .map(CanonId::new_unchecked)
        .map_err(|_| anyhow!("canon_id {} out of range", raw))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid uuid '{}'", raw))
}

fn row_to_mapping_entry(row: &SqliteRow) -> Result<MappingEntry> {
    let key: String = row.try_get("normalized_path")?;
    let source: String = row.try_get("source")?;
    let status: String = row.try_get("status")?;
    let entry_id: String = row.try_get("entry_id")?;
    let confidence: Option<f64> = row.try_get("confidence")?;

    let status = match status.as_str() {
        "active" => MappingStatus::Active,
        "superseded" => {
            let by: Option<String> = row.try_get("superseded_by")?;
            let by = by.ok_or_else(|| anyhow!("superseded row {} without successor", entry_id))?;
            let at = parse_optional_time(row, "superseded_at")?
                .ok_or_else(|| anyhow!("superseded row {} without timestamp", entry_id))?;
            MappingStatus::Superseded {
                by: parse_uuid(&by)?,
                at,
            }
        }
        other => bail!("Unknown mapping status '{}'", other),
    };

    Ok(MappingEntry {
        entry_id: parse_uuid(&entry_id)?,
        normalized_path: from_key(&key),
        canon_id: canon_id_from(row.try_get("canon_id")?)?,
        confidence: confidence.map(|c| c as f32),
        provenance: Provenance {
            approved_by: row.try_get("approved_by")?,
            approved_at: parse_time(row, "approved_at")?,
            source: ApprovalSource::parse(&source).ok_or_else(|| anyhow!("Unknown approval source '{}'", source))?,
            note: row.try_get("note")?,
        },
        status,
    })
}

fn row_to_product(row: &SqliteRow) -> Result<Product> {
    let state: String = row.try_get("resolution_state")?;
    let canon_id: Option<i64> = row.try_get("canon_id")?;
    let path: Option<String> = row.try_get("breadcrumb_path_norm")?;

    let resolution_state = match (state.as_str(), canon_id) {
        ("resolved", Some(id)) => ResolutionState::Resolved(canon_id_from(id)?),
        (reason, None) => ResolutionState::Unmapped(
            UnmappedReason::parse(reason).ok_or_else(|| anyhow!("Unknown resolution state '{}'", reason))?,
        ),
        (other, Some(_)) => bail!("Resolution state '{}' with a canon_id", other),
    };

    Ok(Product {
        store_id: row.try_get("store_id")?,
        store_product_id: row.try_get("store_product_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        source_url: row.try_get("source_url")?,
        breadcrumb_path_norm: path.filter(|p| !p.is_empty()).map(|p| from_key(&p)),
        resolution_state,
        scraped_at: parse_time(row, "scraped_at")?,
    })
}

fn row_to_unmapped(row: &SqliteRow) -> Result<UnmappedRecord> {
    let key: String = row.try_get("normalized_path")?;
    let status: String = row.try_get("status")?;
    let urls: String = row.try_get("example_urls")?;
    let count: i64 = row.try_get("occurrence_count")?;
    let resolved_canon_id: Option<i64> = row.try_get("resolved_canon_id")?;
    let resolved_entry_id: Option<String> = row.try_get("resolved_entry_id")?;
    let resolved_at = parse_optional_time(row, "resolved_at")?;

    let resolution = match (resolved_canon_id, resolved_entry_id, resolved_at) {
        (Some(canon_id), Some(entry_id), Some(resolved_at)) => Some(RecordResolution {
            canon_id: canon_id_from(canon_id)?,
            entry_id: parse_uuid(&entry_id)?,
            resolved_at,
        }),
        _ => None,
    };

    Ok(UnmappedRecord {
        normalized_path: from_key(&key),
        first_seen_at: parse_time(row, "first_seen_at")?,
        last_seen_at: parse_time(row, "last_seen_at")?,
        occurrence_count: u64::try_from(count).unwrap_or(0),
        status: ReviewStatus::parse(&status).ok_or_else(|| anyhow!("Unknown review status '{}'", status))?,
        example_urls: serde_json::from_str(&urls).context("Invalid example_urls")?,
        resolution,
    })
}

fn row_to_store_path(row: &SqliteRow) -> Result<StoreCategoryPath> {
    let key: String = row.try_get("normalized_path")?;
    let source_kind: String = row.try_get("source_kind")?;
    let status: String = row.try_get("status")?;
    let canon_id: Option<i64> = row.try_get("canon_id")?;
    let depth: i64 = row.try_get("depth")?;
    let occurrences: i64 = row.try_get("occurrences")?;

    let status = match (status.as_str(), canon_id) {
        ("approved", Some(id)) => CandidateStatus::Approved(canon_id_from(id)?),
        ("candidate", _) => CandidateStatus::Candidate,
        (other, _) => bail!("Unknown candidate status '{}'", other),
    };

    Ok(StoreCategoryPath {
        store_id: row.try_get("store_id")?,
        raw: row.try_get("raw_path")?,
        normalized: from_key(&key),
        depth: usize::try_from(depth).unwrap_or(0),
        example_url: row.try_get("example_url")?,
        source_kind: BreadcrumbSourceKind::parse(&source_kind)
            .ok_or_else(|| anyhow!("Unknown source kind '{}'", source_kind))?,
        occurrences: u64::try_from(occurrences).unwrap_or(0),
        status,
        first_seen_at: parse_time(row, "first_seen_at")?,
        last_seen_at: parse_time(row, "last_seen_at")?,
    })
}

#[async_trait]
impl TaxonomyRepository for SqliteCatalogRepository {
    async fn seed_taxonomy(&self, taxonomy: &CanonicalTaxonomy) -> Result<()> {
        if let Some(existing) = self.load_taxonomy(taxonomy.len()).await.ok().flatten() {
            if &existing == taxonomy {
                tracing::debug!("Canonical taxonomy already seeded");
                return Ok(());
            }
            bail!("canonical_categories already holds a different taxonomy; refusing to re-seed");
        }
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM canonical_categories")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            bail!("canonical_categories holds {} rows that do not form the expected taxonomy", count);
        }

        let mut tx = self.pool.begin().await?;
        for category in taxonomy.categories() {
            sqlx::query("INSERT INTO canonical_categories (canon_id, name, parent_id) VALUES ($1, $2, NULL)")
                .bind(i64::from(category.canon_id.get()))
                .bind(&category.name)
                .execute(&mut *tx)
                .await?;
        }
        // Parents are linked once every row exists
        for category in taxonomy.categories() {
            if let Some(parent) = category.parent_id {
                sqlx::query("UPDATE canonical_categories SET parent_id = $1 WHERE canon_id = $2")
                    .bind(i64::from(parent.get()))
                    .bind(i64::from(category.canon_id.get()))
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        tracing::info!(categories = taxonomy.len(), "Canonical taxonomy seeded");
        Ok(())
    }

    async fn load_taxonomy(&self, expected_size: usize) -> Result<Option<CanonicalTaxonomy>> {
        let rows = sqlx::query("SELECT canon_id, name, parent_id FROM canonical_categories ORDER BY canon_id")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let categories = rows
            .iter()
            .map(|row| -> Result<CanonicalCategory> {
                let parent: Option<i64> = row.try_get("parent_id")?;
                Ok(CanonicalCategory {
                    canon_id: canon_id_from(row.try_get("canon_id")?)?,
                    name: row.try_get("name")?,
                    parent_id: parent.map(canon_id_from).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let taxonomy = CanonicalTaxonomy::with_expected_size(categories, expected_size)?;
        Ok(Some(taxonomy))
    }
}

#[async_trait]
impl MappingRepository for SqliteCatalogRepository {
    async fn append_entry(&self, entry: &MappingEntry) -> Result<()> {
        let (status, superseded_by, superseded_at) = match &entry.status {
            MappingStatus::Active => ("active", None, None),
            MappingStatus::Superseded { by, at } => ("superseded", Some(by.to_string()), Some(at.to_rfc3339())),
        };

        sqlx::query(
            r#"
            INSERT INTO category_mapping
                (entry_id, normalized_path, canon_id, confidence, approved_by, approved_at, source, note,
                 status, superseded_by, superseded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.entry_id.to_string())
        .bind(entry.normalized_path.as_key())
        .bind(i64::from(entry.canon_id.get()))
        .bind(entry.confidence.map(f64::from))
        .bind(&entry.provenance.approved_by)
        .bind(entry.provenance.approved_at.to_rfc3339())
        .bind(entry.provenance.source.as_str())
        .bind(&entry.provenance.note)
        .bind(status)
        .bind(superseded_by)
        .bind(superseded_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append mapping for '{}'", entry.normalized_path))?;

        Ok(())
    }

    async fn mark_superseded(&self, entry: &MappingEntry) -> Result<()> {
        let MappingStatus::Superseded { by, at } = &entry.status else {
            bail!("mapping entry {} is not superseded", entry.entry_id);
        };

        let result = sqlx::query(
            "UPDATE category_mapping SET status = 'superseded', superseded_by = $1, superseded_at = $2 WHERE entry_id = $3",
        )
        .bind(by.to_string())
        .bind(at.to_rfc3339())
        .bind(entry.entry_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("mapping entry {} not found", entry.entry_id);
        }
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<MappingEntry>> {
        let rows = sqlx::query("SELECT * FROM category_mapping ORDER BY approved_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_mapping_entry).collect()
    }
}

#[async_trait]
impl ProductRepository for SqliteCatalogRepository {
    async fn upsert_products(&self, products: &[Product]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for product in products {
            sqlx::query(
                r#"
                INSERT INTO products
                    (store_id, store_product_id, name, price, source_url, breadcrumb_path_norm,
                     resolution_state, canon_id, scraped_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (store_id, store_product_id) DO UPDATE SET
                    name = excluded.name,
                    price = excluded.price,
                    source_url = excluded.source_url,
                    breadcrumb_path_norm = excluded.breadcrumb_path_norm,
                    resolution_state = excluded.resolution_state,
                    canon_id = excluded.canon_id,
                    scraped_at = excluded.scraped_at
                "#,
            )
            .bind(&product.store_id)
            .bind(&product.store_product_id)
            .bind(&product.name)
            .bind(product.price)
            .bind(&product.source_url)
            .bind(product.breadcrumb_path_norm.as_ref().map(|p| p.as_key().to_string()))
            .bind(product.resolution_state.label())
            .bind(product.canon_id().map(|id| i64::from(id.get())))
            .bind(product.scraped_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert product {}", product.key()))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_products(&self, store_id: Option<&str>) -> Result<Vec<Product>> {
        let rows = match store_id {
            Some(store_id) => {
                sqlx::query("SELECT * FROM products WHERE store_id = $1 ORDER BY store_id, store_product_id")
                    .bind(store_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM products ORDER BY store_id, store_product_id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_product).collect()
    }
}

#[async_trait]
impl UnmappedRecordRepository for SqliteCatalogRepository {
    async fn upsert_records(&self, records: &[UnmappedRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let resolution = record.resolution.as_ref();
            sqlx::query(
                r#"
                INSERT INTO unmapped_review_queue
                    (normalized_path, first_seen_at, last_seen_at, occurrence_count, status, example_urls,
                     resolved_canon_id, resolved_entry_id, resolved_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (normalized_path) DO UPDATE SET
                    first_seen_at = excluded.first_seen_at,
                    last_seen_at = excluded.last_seen_at,
                    occurrence_count = excluded.occurrence_count,
                    status = excluded.status,
                    example_urls = excluded.example_urls,
                    resolved_canon_id = excluded.resolved_canon_id,
                    resolved_entry_id = excluded.resolved_entry_id,
                    resolved_at = excluded.resolved_at
                "#,
            )
            .bind(record.normalized_path.as_key())
            .bind(record.first_seen_at.to_rfc3339())
            .bind(record.last_seen_at.to_rfc3339())
            .bind(i64::try_from(record.occurrence_count).unwrap_or(i64::MAX))
            .bind(record.status.as_str())
            .bind(serde_json::to_string(&record.example_urls)?)
            .bind(resolution.map(|r| i64::from(r.canon_id.get())))
            .bind(resolution.map(|r| r.entry_id.to_string()))
            .bind(resolution.map(|r| r.resolved_at.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_records(&self) -> Result<Vec<UnmappedRecord>> {
        let rows = sqlx::query("SELECT * FROM unmapped_review_queue ORDER BY occurrence_count DESC, normalized_path")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_unmapped).collect()
    }
}

#[async_trait]
impl CategoryPathRepository for SqliteCatalogRepository {
    async fn upsert_paths(&self, paths: &[StoreCategoryPath]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for path in paths {
            let canon_id = match path.status {
                CandidateStatus::Approved(id) => Some(i64::from(id.get())),
                CandidateStatus::Candidate => None,
            };
            sqlx::query(
                r#"
                INSERT INTO store_category_paths
                    (store_id, normalized_path, raw_path, depth, example_url, source_kind, occurrences,
                     status, canon_id, first_seen_at, last_seen_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (store_id, normalized_path) DO UPDATE SET
                    raw_path = excluded.raw_path,
                    depth = excluded.depth,
                    example_url = excluded.example_url,
                    source_kind = excluded.source_kind,
                    occurrences = excluded.occurrences,
                    status = excluded.status,
                    canon_id = excluded.canon_id,
                    first_seen_at = excluded.first_seen_at,
                    last_seen_at = excluded.last_seen_at
                "#,
            )
            .bind(&path.store_id)
            .bind(path.normalized.as_key())
            .bind(&path.raw)
            .bind(i64::try_from(path.depth).unwrap_or(i64::MAX))
            .bind(&path.example_url)
            .bind(path.source_kind.as_str())
            .bind(i64::try_from(path.occurrences).unwrap_or(i64::MAX))
            .bind(path.status.label())
            .bind(canon_id)
            .bind(path.first_seen_at.to_rfc3339())
            .bind(path.last_seen_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_paths(&self) -> Result<Vec<StoreCategoryPath>> {
        let rows = sqlx::query("SELECT * FROM store_category_paths ORDER BY store_id, normalized_path")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_store_path).collect()
    }
}

#[async_trait]
impl CoverageRepository for SqliteCatalogRepository {
    async fn save_report(&self, report: &CoverageReport) -> Result<()> {
        let coverage = &report.coverage;
        let stability_json = report
            .stability
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO coverage_reports
                (run_id, timestamp, percent_labelled, total_products, mapping_version, snapshot_json, stability_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&coverage.run_id)
        .bind(coverage.timestamp.to_rfc3339())
        .bind(coverage.percent_labelled)
        .bind(i64::try_from(coverage.total_products).unwrap_or(i64::MAX))
        .bind(i64::try_from(coverage.mapping_version).unwrap_or(i64::MAX))
        .bind(serde_json::to_string(coverage)?)
        .bind(stability_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save coverage report for run {}", coverage.run_id))?;

        Ok(())
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<CoverageSnapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM coverage_reports WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let json: String = row.try_get("snapshot_json")?;
            serde_json::from_str(&json).context("Invalid snapshot_json")
        })
        .transpose()
    }

    async fn latest_snapshot(&self) -> Result<Option<CoverageSnapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM coverage_reports ORDER BY timestamp DESC, rowid DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let json: String = row.try_get("snapshot_json")?;
            serde_json::from_str(&json).context("Invalid snapshot_json")
        })
        .transpose()
    }
}
