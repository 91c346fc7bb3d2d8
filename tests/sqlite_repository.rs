//! SQLite persistence of the catalog record tables
mod common;

use anyhow::Result;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

use catalog_canon::application::{ApprovalRequest, CatalogContext};
use catalog_canon::domain::breadcrumb::BreadcrumbSourceKind;
use catalog_canon::domain::canonical::{CanonicalCategory, CanonicalTaxonomy};
use catalog_canon::domain::category_paths::{CandidateStatus, StoreCategoryPath};
use catalog_canon::domain::coverage::CoverageReport;
use catalog_canon::domain::mapping::MappingStatus;
use catalog_canon::domain::repositories::{
    CategoryPathRepository, CoverageRepository, MappingRepository, ProductRepository, TaxonomyRepository,
    UnmappedRecordRepository,
};
use catalog_canon::domain::services::breadcrumb_normalizer::normalize_raw;
use catalog_canon::domain::services::{CoverageMonitor, MappingResolver, UnmappedReviewLedger};
use catalog_canon::domain::unmapped::ReviewStatus;
use catalog_canon::infrastructure::config::CanonConfig;
use catalog_canon::infrastructure::{DatabaseConnection, SqliteCatalogRepository};

async fn open_repository(dir: &TempDir) -> Result<SqliteCatalogRepository> {
    let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
    let db = DatabaseConnection::new(&url).await?;
    db.migrate().await?;
    Ok(SqliteCatalogRepository::new(db.pool().clone()))
}

async fn seeded_repository(dir: &TempDir) -> Result<SqliteCatalogRepository> {
    let repo = open_repository(dir).await?;
    repo.seed_taxonomy(&common::taxonomy()).await?;
    Ok(repo)
}

#[tokio::test]
async fn taxonomy_seeds_once_and_refuses_a_different_set() -> Result<()> {
    let dir = tempdir()?;
    let repo = open_repository(&dir).await?;
    assert!(repo.load_taxonomy(113).await?.is_none());

    let taxonomy = common::taxonomy();
    repo.seed_taxonomy(&taxonomy).await?;
    repo.seed_taxonomy(&taxonomy).await?;

    let loaded = repo.load_taxonomy(113).await?.expect("seeded");
    assert_eq!(&loaded, taxonomy.as_ref());
    assert_eq!(loaded.get(common::id(3)).map(|c| c.parent_id), Some(Some(common::id(2))));

    let mut renamed = common::categories();
    renamed[0] = CanonicalCategory::new(1, "Food", None);
    let renamed = CanonicalTaxonomy::new(renamed)?;
    assert!(repo.seed_taxonomy(&renamed).await.is_err());
    Ok(())
}

#[tokio::test]
async fn mapping_history_keeps_superseded_rows() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let ledger = UnmappedReviewLedger::new(common::table_with(&[]), MappingResolver::default());
    let path = normalize_raw("Grocery > Dairy & Eggs");

    let first = ledger.approve_with_confidence(&path, common::id(2), Some(0.75), common::curator(1), false)?;
    repo.append_entry(&first.entry).await?;

    let second = ledger.approve(&path, common::id(3), common::curator(2), true)?;
    let old = second.superseded.clone().expect("superseded entry");
    repo.mark_superseded(&old).await?;
    repo.append_entry(&second.entry).await?;

    let history = repo.load_history().await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].entry_id, first.entry.entry_id);
    assert_eq!(history[0].confidence, Some(0.75));
    assert!(matches!(history[0].status, MappingStatus::Superseded { by, .. } if by == second.entry.entry_id));
    assert_eq!(history[1], second.entry);
    Ok(())
}

#[tokio::test]
async fn superseding_an_active_entry_requires_it_to_be_superseded() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let ledger = UnmappedReviewLedger::new(common::table_with(&[]), MappingResolver::default());
    let receipt = ledger.approve(&normalize_raw("Pantry"), common::id(4), common::curator(1), false)?;
    repo.append_entry(&receipt.entry).await?;

    assert!(repo.mark_superseded(&receipt.entry).await.is_err());
    Ok(())
}

#[tokio::test]
async fn products_upsert_by_store_and_id() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let table = common::table_with(&[("Grocery", 1)]);

    let milk = common::product("111", Some("Grocery > Milk"), &table, common::at(10));
    let tv = common::product("222", Some("Electronics > TVs"), &table, common::at(10));
    let bare = common::product("333", None, &table, common::at(10));
    repo.upsert_products(&[milk.clone(), tv.clone(), bare.clone()]).await?;

    let mut rescraped = tv.clone();
    rescraped.name = Some("Smart TV 55\"".into());
    rescraped.scraped_at = common::at(20);
    repo.upsert_products(&[rescraped.clone()]).await?;

    let stored = repo.load_products(Some("walmart-ca")).await?;
    assert_eq!(stored, vec![milk, rescraped, bare]);
    assert!(repo.load_products(Some("other-store")).await?.is_empty());
    assert_eq!(repo.load_products(None).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn review_queue_round_trips_with_resolution() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let ledger = UnmappedReviewLedger::new(common::table_with(&[]), MappingResolver::default());

    let chips = normalize_raw("Grocery > Snacks > Chips");
    let tvs = normalize_raw("Electronics > TVs");
    ledger.record_at(&chips, "https://www.walmart.ca/en/ip/chips/1", common::at(1));
    ledger.record_at(&chips, "https://www.walmart.ca/en/ip/chips/2", common::at(2));
    ledger.record_at(&tvs, "https://www.walmart.ca/en/ip/tv/3", common::at(3));
    repo.upsert_records(&ledger.all_records()).await?;

    let receipt = ledger.approve(&normalize_raw("Grocery"), common::id(1), common::curator(5), false)?;
    repo.upsert_records(&receipt.resolved_records).await?;

    let stored = repo.load_records().await?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].normalized_path, chips);
    assert_eq!(stored[0].occurrence_count, 2);
    assert_eq!(stored[0].status, ReviewStatus::Resolved);
    assert_eq!(stored[0], receipt.resolved_records[0]);
    assert_eq!(stored[1].normalized_path, tvs);
    assert!(stored[1].is_pending());
    Ok(())
}

#[tokio::test]
async fn category_paths_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let normalized = normalize_raw("Grocery > Dairy & Eggs");
    let mut path = StoreCategoryPath {
        store_id: "walmart-ca".into(),
        raw: "Grocery > Dairy & Eggs".into(),
        depth: normalized.depth(),
        normalized,
        example_url: "https://www.walmart.ca/en/browse/grocery/dairy-eggs/10019".into(),
        source_kind: BreadcrumbSourceKind::CategoryPage,
        occurrences: 1,
        status: CandidateStatus::Candidate,
        first_seen_at: common::at(1),
        last_seen_at: common::at(1),
    };
    repo.upsert_paths(&[path.clone()]).await?;

    path.occurrences = 4;
    path.last_seen_at = common::at(9);
    path.status = CandidateStatus::Approved(common::id(2));
    repo.upsert_paths(&[path.clone()]).await?;

    assert_eq!(repo.load_paths().await?, vec![path]);
    Ok(())
}

#[tokio::test]
async fn coverage_reports_load_by_run_and_latest() -> Result<()> {
    let dir = tempdir()?;
    let repo = seeded_repository(&dir).await?;
    let table = common::table_with(&[("Grocery", 1)]);
    let monitor = CoverageMonitor::default();
    assert!(repo.latest_snapshot().await?.is_none());

    let products = vec![
        common::product("a", Some("Grocery > Milk"), &table, common::at(1)),
        common::product("b", Some("Electronics"), &table, common::at(1)),
    ];
    let mut first = monitor.compute_coverage("run-1", &products, table.taxonomy(), 1);
    first.timestamp = common::at(10);
    let mut second = monitor.compute_coverage("run-2", &products[..1], table.taxonomy(), 1);
    second.timestamp = common::at(20);
    let stability = monitor.compute_stability(&first, &second, &table.snapshot());

    repo.save_report(&CoverageReport {
        coverage: first.clone(),
        stability: None,
    })
    .await?;
    repo.save_report(&CoverageReport {
        coverage: second.clone(),
        stability: Some(stability),
    })
    .await?;

    let loaded = repo.load_snapshot("run-1").await?.expect("run-1 stored");
    assert_eq!(loaded, first);
    assert_eq!(loaded.percent_labelled, 50.0);
    assert_eq!(repo.latest_snapshot().await?, Some(second));
    assert!(repo.load_snapshot("run-3").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn context_restores_curated_state_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let categories_file = dir.path().join("categories.json");
    std::fs::write(&categories_file, serde_json::to_string(&common::categories())?)?;

    let mut config = CanonConfig::default();
    config.taxonomy.categories_file = Some(categories_file);
    config.database.url = format!("sqlite:{}", dir.path().join("context.db").display());
    config.database.max_connections = 1;

    {
        let context = CatalogContext::open(config.clone()).await?;
        assert_eq!(context.taxonomy().len(), 113);
        context.ledger().record(&normalize_raw("Electronics > TVs"), "https://www.walmart.ca/en/ip/tv/1");
        context
            .store()
            .upsert_records(&context.ledger().all_records())
            .await?;

        let curation = context.curation();
        curation
            .approve_unmapped(&ApprovalRequest::new("Electronics", 5, "tester").with_note("whole department"))
            .await?;
        curation
            .approve_unmapped(&ApprovalRequest::new("Grocery", 1, "tester"))
            .await?;
        assert!(
            curation
                .approve_unmapped(&ApprovalRequest::new("Grocery", 500, "tester"))
                .await
                .is_err()
        );
    }

    let reopened = CatalogContext::open(config).await?;
    let snapshot = reopened.ledger().table().snapshot();
    assert_eq!(snapshot.active_len(), 2);
    assert_eq!(snapshot.lookup("electronics"), Some(common::id(5)));
    assert_eq!(
        snapshot.active_entry("electronics").and_then(|e| e.provenance.note.clone()),
        Some("whole department".to_string())
    );
    assert!(reopened.ledger().pending_queue().is_empty());
    assert_eq!(reopened.ledger().len(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_store_without_categories_file_fails_to_bootstrap() -> Result<()> {
    let dir = tempdir()?;
    let repo = Arc::new(open_repository(&dir).await?);
    let result = CatalogContext::bootstrap(CanonConfig::default(), repo).await;
    assert!(result.is_err());
    Ok(())
}
