//! Repository interfaces for the catalog record tables
//!
//! One trait per record family. The SQLite adapter in infrastructure implements
//! all of them; history tables are append-only through these ports.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::canonical::CanonicalTaxonomy;
use crate::domain::category_paths::StoreCategoryPath;
use crate::domain::coverage::{CoverageReport, CoverageSnapshot};
use crate::domain::mapping::MappingEntry;
use crate::domain::product::Product;
use crate::domain::unmapped::UnmappedRecord;

#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    /// Seeds `canonical_categories`. Seeding an identical set again is a no-op;
    /// a different set is refused.
    async fn seed_taxonomy(&self, taxonomy: &CanonicalTaxonomy) -> Result<()>;
    async fn load_taxonomy(&self, expected_size: usize) -> Result<Option<CanonicalTaxonomy>>;
}

#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn append_entry(&self, entry: &MappingEntry) -> Result<()>;
    /// Records that `entry` was superseded. The row itself is kept.
    async fn mark_superseded(&self, entry: &MappingEntry) -> Result<()>;
    async fn load_history(&self) -> Result<Vec<MappingEntry>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn upsert_products(&self, products: &[Product]) -> Result<()>;
    async fn load_products(&self, store_id: Option<&str>) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait UnmappedRecordRepository: Send + Sync {
    async fn upsert_records(&self, records: &[UnmappedRecord]) -> Result<()>;
    async fn load_records(&self) -> Result<Vec<UnmappedRecord>>;
}

#[async_trait]
pub trait CategoryPathRepository: Send + Sync {
    async fn upsert_paths(&self, paths: &[StoreCategoryPath]) -> Result<()>;
    async fn load_paths(&self) -> Result<Vec<StoreCategoryPath>>;
}

#[async_trait]
pub trait CoverageRepository: Send + Sync {
    async fn save_report(&self, report: &CoverageReport) -> Result<()>;
    async fn load_snapshot(&self, run_id: &str) -> Result<Option<CoverageSnapshot>>;
    async fn latest_snapshot(&self) -> Result<Option<CoverageSnapshot>>;
}

/// Everything a crawl run persists
pub trait CatalogStore:
    TaxonomyRepository
    + MappingRepository
    + ProductRepository
    + UnmappedRecordRepository
    + CategoryPathRepository
    + CoverageRepository
{
}

impl<T> CatalogStore for T where
    T: TaxonomyRepository
        + MappingRepository
        + ProductRepository
        + UnmappedRecordRepository
        + CategoryPathRepository
        + CoverageRepository
{
}
