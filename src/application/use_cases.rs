//! Use cases: bootstrap from storage, crawl runs, coverage audits

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::curation::CurationService;
use crate::application::dto::RunSummary;
use crate::application::pipeline::{CatalogPipeline, PipelineSettings, RunOutcome, re_resolve_with};
use crate::domain::canonical::{CanonicalCategory, CanonicalTaxonomy};
use crate::domain::coverage::{CoverageReport, CoverageSnapshot};
use crate::domain::mapping::MappingTable;
use crate::domain::product::Product;
use crate::domain::repositories::CatalogStore;
use crate::domain::services::{
    CoverageMonitor, MappingResolver, PageFetcher, StoreCategoryPathRegistry, UnmappedReviewLedger, UrlClassifier,
};
use crate::infrastructure::config::CanonConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::parsing::ProductPageParser;
use crate::infrastructure::repositories::SqliteCatalogRepository;
use crate::infrastructure::sitemap_parser::SitemapFilter;

/// Reads a taxonomy JSON file: an array of `{ canon_id, name, parent_id }`.
pub async fn read_taxonomy_file(path: &Path, expected_size: usize) -> Result<CanonicalTaxonomy> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read taxonomy file {:?}", path))?;
    let categories: Vec<CanonicalCategory> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid taxonomy file {:?}", path))?;
    Ok(CanonicalTaxonomy::with_expected_size(categories, expected_size)?)
}

/// A crawl run together with what was persisted for it
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub coverage: CoverageReport,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_outcome(&self.outcome, Some(&self.coverage))
    }
}

/// Services wired over one store, restored from its persisted state
pub struct CatalogContext {
    config: CanonConfig,
    store: Arc<dyn CatalogStore>,
    taxonomy: Arc<CanonicalTaxonomy>,
    resolver: MappingResolver,
    ledger: Arc<UnmappedReviewLedger>,
    registry: Arc<StoreCategoryPathRegistry>,
}

impl CatalogContext {
    /// Opens the configured database, migrates it and restores state.
    pub async fn open(config: CanonConfig) -> Result<Self> {
        let db = DatabaseConnection::with_max_connections(&config.database.url, config.database.max_connections)
            .await?;
        db.migrate().await?;
        let store = Arc::new(SqliteCatalogRepository::new(db.pool().clone()));
        Self::bootstrap(config, store).await
    }

    /// Restores taxonomy, mapping history, review queue and category candidates.
    ///
    /// An empty store is seeded from `taxonomy.categories_file`.
    pub async fn bootstrap(config: CanonConfig, store: Arc<dyn CatalogStore>) -> Result<Self> {
        let expected_size = config.taxonomy.expected_size;
        let taxonomy = match store.load_taxonomy(expected_size).await? {
            Some(taxonomy) => taxonomy,
            None => {
                let file = config
                    .taxonomy
                    .categories_file
                    .as_deref()
                    .ok_or_else(|| anyhow!("Canonical taxonomy is not seeded and taxonomy.categories_file is not set"))?;
                let taxonomy = read_taxonomy_file(file, expected_size).await?;
                store.seed_taxonomy(&taxonomy).await?;
                info!(categories = taxonomy.len(), file = ?file, "Canonical taxonomy seeded");
                taxonomy
            }
        };
        let taxonomy = Arc::new(taxonomy);

        let history = store.load_history().await?;
        let table = Arc::new(
            MappingTable::from_history(Arc::clone(&taxonomy), history).context("Mapping history is inconsistent")?,
        );
        let resolver = MappingResolver::new(config.resolver.to_resolver_config());

        let ledger = Arc::new(UnmappedReviewLedger::with_capacity(
            Arc::clone(&table),
            resolver,
            config.ledger.max_example_urls,
        ));
        ledger.restore(store.load_records().await?);

        let registry = Arc::new(StoreCategoryPathRegistry::new());
        registry.restore(store.load_paths().await?);

        let snapshot = table.snapshot();
        info!(
            categories = taxonomy.len(),
            active_mappings = snapshot.active_len(),
            mapping_version = snapshot.version(),
            queued_paths = ledger.len(),
            "Catalog state restored"
        );

        Ok(Self {
            config,
            store,
            taxonomy,
            resolver,
            ledger,
            registry,
        })
    }

    pub fn config(&self) -> &CanonConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn taxonomy(&self) -> &Arc<CanonicalTaxonomy> {
        &self.taxonomy
    }

    pub fn resolver(&self) -> MappingResolver {
        self.resolver
    }

    pub fn ledger(&self) -> &Arc<UnmappedReviewLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<StoreCategoryPathRegistry> {
        &self.registry
    }

    pub fn curation(&self) -> CurationService {
        CurationService::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
        )
    }

    pub fn pipeline(&self) -> Result<CatalogPipeline> {
        let classifier =
            UrlClassifier::new(&self.config.classifier.to_rules()).context("Invalid classifier pattern")?;
        let parser = ProductPageParser::with_breadcrumb_selectors(&self.config.normalizer.breadcrumb_selectors)?;
        let pipeline_config = &self.config.pipeline;
        let mut filter = SitemapFilter::default();
        if let Some(max_urls) = pipeline_config.max_urls_per_sitemap {
            filter = filter.max_urls(max_urls);
        }

        Ok(CatalogPipeline::new(
            pipeline_config.store_id.clone(),
            classifier,
            parser,
            self.resolver,
            Arc::clone(&self.ledger),
            Arc::clone(&self.registry),
            PipelineSettings {
                max_concurrent_pages: pipeline_config.max_concurrent_pages,
                max_index_depth: pipeline_config.max_index_depth,
                sitemap_filter: filter,
            },
        ))
    }

    /// Runs a crawl, persists its records and a coverage report.
    pub async fn run_and_persist(&self, fetcher: &dyn PageFetcher, sitemap_roots: &[String]) -> Result<RunReport> {
        let pipeline = self.pipeline()?;
        let outcome = pipeline.run(fetcher, sitemap_roots).await;

        self.store
            .upsert_products(&outcome.products)
            .await
            .context("Failed to persist products")?;
        self.store
            .upsert_records(&outcome.unmapped)
            .await
            .context("Failed to persist unmapped review queue")?;
        self.store
            .upsert_paths(&outcome.category_paths)
            .await
            .context("Failed to persist category paths")?;

        if outcome.is_aborted() {
            warn!(run_id = %outcome.run_id, "Coverage computed over a partial run");
        }
        let coverage = self
            .record_coverage(&outcome.run_id, &outcome.products, outcome.mapping_version)
            .await?;
        Ok(RunReport { outcome, coverage })
    }

    /// Re-resolves every stored product against the current mapping and
    /// records coverage for the result. The review queue is left alone.
    pub async fn audit(&self) -> Result<CoverageReport> {
        let snapshot = self.ledger.table().snapshot();
        let stored = self
            .store
            .load_products(Some(self.config.pipeline.store_id.as_str()))
            .await?;
        let products = re_resolve_with(&self.resolver, &snapshot, &stored);

        let changed: Vec<Product> = products
            .iter()
            .zip(&stored)
            .filter(|(now, before)| now.resolution_state != before.resolution_state)
            .map(|(now, _)| now.clone())
            .collect();
        if !changed.is_empty() {
            self.store.upsert_products(&changed).await?;
        }
        info!(products = products.len(), changed = changed.len(), "Stored products re-resolved");

        let run_id = format!("audit-{}", Uuid::new_v4());
        self.record_coverage(&run_id, &products, snapshot.version()).await
    }

    async fn record_coverage(&self, run_id: &str, products: &[Product], mapping_version: u64) -> Result<CoverageReport> {
        let monitor = CoverageMonitor::new(self.resolver);
        let mut coverage = monitor.compute_coverage(run_id, products, &self.taxonomy, mapping_version);
        // Keeps the stability window ordered even with coarse clocks
        coverage.timestamp = coverage.timestamp.max(Utc::now());

        let previous: Option<CoverageSnapshot> = self.store.latest_snapshot().await?;
        let stability = previous
            .filter(|prev| prev.run_id != coverage.run_id)
            .map(|prev| monitor.compute_stability(&prev, &coverage, &self.ledger.table().snapshot()));

        if let Some(report) = &stability {
            if !report.is_stable() {
                warn!(
                    previous_run = %report.previous_run_id,
                    current_run = %report.current_run_id,
                    drift_flags = report.drift_flags.len(),
                    "Unexplained canon_id changes detected"
                );
            }
        }
        info!(
            run_id,
            percent_labelled = coverage.percent_labelled,
            total = coverage.total_products,
            zero_count_ids = coverage.zero_count_ids.len(),
            "Coverage recorded"
        );

        let report = CoverageReport { coverage, stability };
        self.store.save_report(&report).await.context("Failed to save coverage report")?;
        Ok(report)
    }
}
