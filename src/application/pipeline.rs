//! Crawl-run pipeline
//!
//! Sitemaps → URL classifier → page fetch → breadcrumb extraction → normalizer →
//! resolver / category registry / review ledger. Fetching goes through the
//! [`PageFetcher`] port. A failed URL is recorded and skipped; a block signal
//! cancels the run, which then ends as [`RunStatus::Aborted`] with whatever was
//! already processed.

#![allow(clippy::uninlined_format_args)]

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::category_paths::StoreCategoryPath;
use crate::domain::discovery::{ClassificationRecord, SitemapContext, SitemapDocument, UrlClass};
use crate::domain::mapping::MappingSnapshot;
use crate::domain::product::{Product, ResolutionState, UnmappedReason};
use crate::domain::services::breadcrumb_normalizer::normalize_breadcrumb;
use crate::domain::services::page_fetcher::check_page;
use crate::domain::services::{
    FetchError, MappingResolver, PageFetcher, Resolution, StoreCategoryPathRegistry, UnmappedReviewLedger,
    UrlClassifier,
};
use crate::domain::unmapped::UnmappedRecord;
use crate::infrastructure::parsing::{ParsingError, ProductPageParser};
use crate::infrastructure::sitemap_parser::{SitemapFilter, parse_sitemap};

/// What went wrong for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SitemapFetch,
    SitemapParse,
    PageFetch,
    PageParse,
    Cancelled,
}

/// A URL excluded from the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFailure {
    pub url: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl UrlFailure {
    fn from_fetch(error: &FetchError, sitemap: bool) -> Self {
        let kind = match error {
            FetchError::Cancelled { .. } => FailureKind::Cancelled,
            _ if sitemap => FailureKind::SitemapFetch,
            _ => FailureKind::PageFetch,
        };
        Self {
            url: error.url().to_string(),
            kind,
            detail: error.to_string(),
        }
    }

    fn from_parse(url: &str, error: &ParsingError, sitemap: bool) -> Self {
        Self {
            url: url.to_string(),
            kind: if sitemap {
                FailureKind::SitemapParse
            } else {
                FailureKind::PageParse
            },
            detail: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped after a block signal. Results gathered before it are kept.
    Aborted { url: String, signal: String },
}

/// Everything one crawl run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub mapping_version: u64,
    pub classifications: Vec<ClassificationRecord>,
    pub products: Vec<Product>,
    pub category_paths: Vec<StoreCategoryPath>,
    /// Ledger records touched by this run, after the run.
    pub unmapped: Vec<UnmappedRecord>,
    pub failures: Vec<UrlFailure>,
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }
}

/// Sitemap URLs found by walking the sitemap roots
#[derive(Debug, Default)]
pub struct Discovery {
    pub urls: Vec<(String, SitemapContext)>,
    pub failures: Vec<UrlFailure>,
    pub aborted: Option<FetchError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub max_concurrent_pages: usize,
    pub max_index_depth: usize,
    pub sitemap_filter: SitemapFilter,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_pages: 2,
            max_index_depth: 3,
            sitemap_filter: SitemapFilter::default(),
        }
    }
}

enum PageResult {
    Product(Product),
    Category(Option<StoreCategoryPath>),
}

pub struct CatalogPipeline {
    store_id: String,
    classifier: UrlClassifier,
    parser: ProductPageParser,
    resolver: MappingResolver,
    ledger: Arc<UnmappedReviewLedger>,
    registry: Arc<StoreCategoryPathRegistry>,
    settings: PipelineSettings,
}

impl CatalogPipeline {
    pub fn new(
        store_id: impl Into<String>,
        classifier: UrlClassifier,
        parser: ProductPageParser,
        resolver: MappingResolver,
        ledger: Arc<UnmappedReviewLedger>,
        registry: Arc<StoreCategoryPathRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            classifier,
            parser,
            resolver,
            ledger,
            registry,
            settings: PipelineSettings {
                max_concurrent_pages: settings.max_concurrent_pages.max(1),
                ..settings
            },
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn ledger(&self) -> &Arc<UnmappedReviewLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<StoreCategoryPathRegistry> {
        &self.registry
    }

    /// Walks sitemap indexes breadth-first from `roots`, collecting page URLs.
    ///
    /// Each sitemap is fetched once. A failed sitemap only loses its own URLs.
    pub async fn discover(
        &self,
        fetcher: &dyn PageFetcher,
        roots: &[String],
        cancel: &CancellationToken,
    ) -> Discovery {
        let mut discovery = Discovery::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(SitemapContext, usize)> =
            roots.iter().map(|url| (SitemapContext::new(url.clone()), 0)).collect();

        while let Some((context, depth)) = queue.pop_front() {
            if !visited.insert(context.sitemap_url.clone()) {
                continue;
            }
            if cancel.is_cancelled() {
                discovery.failures.push(UrlFailure::from_fetch(
                    &FetchError::Cancelled {
                        url: context.sitemap_url.clone(),
                    },
                    true,
                ));
                continue;
            }

            let page = match fetcher.fetch(&context.sitemap_url).await.and_then(check_page) {
                Ok(page) => page,
                Err(e) => {
                    warn!(sitemap = %context.sitemap_url, error = %e, "Sitemap fetch failed");
                    discovery.failures.push(UrlFailure::from_fetch(&e, true));
                    if e.is_run_fatal() {
                        cancel.cancel();
                        discovery.aborted = Some(e);
                    }
                    continue;
                }
            };

            match parse_sitemap(page.body.as_bytes()) {
                Ok(SitemapDocument::Index(children)) => {
                    if depth >= self.settings.max_index_depth {
                        warn!(sitemap = %context.sitemap_url, depth, "Sitemap index nested too deep, skipping children");
                        continue;
                    }
                    debug!(sitemap = %context.sitemap_url, children = children.len(), "Sitemap index");
                    for child in children {
                        let child_context = SitemapContext::new(child.loc).with_parent(context.sitemap_url.clone());
                        queue.push_back((child_context, depth + 1));
                    }
                }
                Ok(SitemapDocument::UrlSet(entries)) => {
                    let kept = self.settings.sitemap_filter.apply(entries);
                    debug!(sitemap = %context.sitemap_url, urls = kept.len(), "Sitemap urlset");
                    discovery
                        .urls
                        .extend(kept.into_iter().map(|entry| (entry.loc, context.clone())));
                }
                Err(e) => {
                    warn!(sitemap = %context.sitemap_url, error = %e, "Sitemap parse failed");
                    discovery
                        .failures
                        .push(UrlFailure::from_parse(&context.sitemap_url, &e, true));
                }
            }
        }

        discovery
    }

    /// Runs one crawl over `sitemap_roots`.
    pub async fn run(&self, fetcher: &dyn PageFetcher, sitemap_roots: &[String]) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let cancel = CancellationToken::new();
        let snapshot = self.ledger.table().snapshot();
        info!(run_id = %run_id, roots = sitemap_roots.len(), mapping_version = snapshot.version(), "Crawl run started");

        let discovery = self.discover(fetcher, sitemap_roots, &cancel).await;
        let mut failures = discovery.failures;
        let mut aborted = discovery.aborted;

        let classifications = self
            .classifier
            .classify_batch(discovery.urls.iter().map(|(url, ctx)| (url.as_str(), ctx)));

        let targets: Vec<&ClassificationRecord> = classifications
            .iter()
            .filter(|r| r.class != UrlClass::Noncatalog)
            .collect();
        info!(
            discovered = classifications.len(),
            catalog_pages = targets.len(),
            "URL classification finished"
        );

        let results: Vec<Result<PageResult, (UrlFailure, Option<FetchError>)>> = stream::iter(targets)
            .map(|record| self.process_target(fetcher, record, &snapshot, &cancel))
            .buffer_unordered(self.settings.max_concurrent_pages)
            .collect()
            .await;

        let mut products = Vec::new();
        let mut category_paths = Vec::new();
        for result in results {
            match result {
                Ok(PageResult::Product(product)) => products.push(product),
                Ok(PageResult::Category(path)) => category_paths.extend(path),
                Err((failure, fatal)) => {
                    failures.push(failure);
                    if aborted.is_none() {
                        aborted = fatal;
                    }
                }
            }
        }
        products.sort_by(|a, b| a.key().cmp(&b.key()));
        category_paths.sort_by(|a, b| a.normalized.cmp(&b.normalized));
        category_paths.dedup_by(|a, b| a.normalized == b.normalized);
        // Latest counters, not the state at observation time
        let category_paths: Vec<StoreCategoryPath> = category_paths
            .iter()
            .filter_map(|p| self.registry.get(&p.store_id, p.normalized.as_key()))
            .collect();

        let touched: HashSet<&str> = products
            .iter()
            .filter(|p| matches!(p.resolution_state, ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix)))
            .filter_map(|p| p.breadcrumb_path_norm.as_ref().map(NormalizedPath::as_key))
            .collect();
        let unmapped: Vec<UnmappedRecord> = self
            .ledger
            .all_records()
            .into_iter()
            .filter(|r| touched.contains(r.normalized_path.as_key()))
            .collect();

        let status = match aborted {
            Some(FetchError::PolitenessViolationRisk { url, signal }) => RunStatus::Aborted { url, signal },
            Some(other) => RunStatus::Aborted {
                url: other.url().to_string(),
                signal: other.to_string(),
            },
            None => RunStatus::Completed,
        };

        let outcome = RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            mapping_version: snapshot.version(),
            classifications,
            products,
            category_paths,
            unmapped,
            failures,
        };

        match &outcome.status {
            RunStatus::Completed => info!(
                run_id = %outcome.run_id,
                products = outcome.products.len(),
                categories = outcome.category_paths.len(),
                failures = outcome.failures.len(),
                "Crawl run completed"
            ),
            RunStatus::Aborted { url, signal } => warn!(
                run_id = %outcome.run_id,
                url = %url,
                signal = %signal,
                products = outcome.products.len(),
                "Crawl run aborted on block signal"
            ),
        }
        outcome
    }

    async fn process_target(
        &self,
        fetcher: &dyn PageFetcher,
        record: &ClassificationRecord,
        snapshot: &MappingSnapshot,
        cancel: &CancellationToken,
    ) -> Result<PageResult, (UrlFailure, Option<FetchError>)> {
        let url = record.url.as_str();
        let cancelled = || FetchError::Cancelled { url: url.to_string() };

        if cancel.is_cancelled() {
            return Err((UrlFailure::from_fetch(&cancelled(), false), None));
        }

        let fetched = tokio::select! {
            result = fetcher.fetch(url) => result.and_then(check_page),
            () = cancel.cancelled() => Err(cancelled()),
        };

        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                let fatal = e.is_run_fatal();
                if fatal {
                    warn!(url, error = %e, "Block signal detected, cancelling run");
                    cancel.cancel();
                } else {
                    debug!(url, error = %e, "Page excluded from run");
                }
                return Err((UrlFailure::from_fetch(&e, false), fatal.then_some(e)));
            }
        };

        let scraped_at = Utc::now();
        match record.class {
            UrlClass::Category => Ok(PageResult::Category(self.process_category_page(url, &page.body, scraped_at))),
            _ => self
                .process_product_page_with(url, &page.body, scraped_at, snapshot)
                .map(PageResult::Product)
                .map_err(|e| (UrlFailure::from_parse(url, &e, false), None)),
        }
    }

    /// Records the breadcrumb of a category page as a candidate path.
    pub fn process_category_page(
        &self,
        url: &str,
        body: &str,
        seen_at: DateTime<Utc>,
    ) -> Option<StoreCategoryPath> {
        let breadcrumb = self.parser.parse_category(body)?;
        let observed = self.registry.observe(&self.store_id, &breadcrumb, url, seen_at);
        if let Some(path) = &observed {
            debug!(url, path = %path.normalized, "Category path observed");
        }
        observed
    }

    /// Parses and resolves a product page against the current snapshot.
    pub fn process_product_page(
        &self,
        url: &str,
        body: &str,
        scraped_at: DateTime<Utc>,
    ) -> Result<Product, ParsingError> {
        let snapshot = self.ledger.table().snapshot();
        self.process_product_page_with(url, body, scraped_at, &snapshot)
    }

    fn process_product_page_with(
        &self,
        url: &str,
        body: &str,
        scraped_at: DateTime<Utc>,
        snapshot: &MappingSnapshot,
    ) -> Result<Product, ParsingError> {
        let page = self.parser.parse_product(url, body)?;
        let path = page
            .breadcrumb
            .as_ref()
            .map(normalize_breadcrumb)
            .filter(|p| !p.is_empty());

        let resolution_state = match &path {
            None => ResolutionState::Unmapped(UnmappedReason::NoBreadcrumb),
            Some(path) => match self.resolver.resolve(path, snapshot) {
                Resolution::Resolved { canon_id, .. } => ResolutionState::Resolved(canon_id),
                Resolution::Unmapped => {
                    self.ledger.record_at(path, url, scraped_at);
                    ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix)
                }
            },
        };

        Ok(Product {
            store_id: self.store_id.clone(),
            store_product_id: page.store_product_id.unwrap_or_else(|| fallback_product_id(url)),
            name: page.name,
            price: page.price,
            source_url: url.to_string(),
            breadcrumb_path_norm: path,
            resolution_state,
            scraped_at,
        })
    }

    /// Re-resolves stored products against the current snapshot.
    ///
    /// The ledger is not touched; order is preserved.
    pub fn re_resolve(&self, products: &[Product]) -> Vec<Product> {
        let snapshot = self.ledger.table().snapshot();
        re_resolve_with(&self.resolver, &snapshot, products)
    }
}

/// Re-resolution against an explicit snapshot, in parallel.
pub fn re_resolve_with(resolver: &MappingResolver, snapshot: &MappingSnapshot, products: &[Product]) -> Vec<Product> {
    products
        .par_iter()
        .map(|product| {
            let mut next = product.clone();
            next.resolution_state = match &product.breadcrumb_path_norm {
                Some(path) if !path.is_empty() => match resolver.resolve(path, snapshot) {
                    Resolution::Resolved { canon_id, .. } => ResolutionState::Resolved(canon_id),
                    Resolution::Unmapped => ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix),
                },
                _ => ResolutionState::Unmapped(UnmappedReason::NoBreadcrumb),
            };
            next
        })
        .collect()
}

/// Stable id for pages that expose none: a short blake3 digest of the URL.
fn fallback_product_id(url: &str) -> String {
    let digest = blake3::hash(url.trim().as_bytes()).to_hex();
    format!("url-{}", &digest.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_product_id_is_stable() {
        let a = fallback_product_id("https://www.walmart.ca/en/ip/thing");
        assert_eq!(a, fallback_product_id(" https://www.walmart.ca/en/ip/thing "));
        assert!(a.starts_with("url-"));
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_failure_kinds() {
        let fetch = FetchError::PageFetchFailure {
            url: "u".into(),
            status: Some(500),
            reason: "boom".into(),
        };
        assert_eq!(UrlFailure::from_fetch(&fetch, false).kind, FailureKind::PageFetch);
        assert_eq!(UrlFailure::from_fetch(&fetch, true).kind, FailureKind::SitemapFetch);
        let cancelled = FetchError::Cancelled { url: "u".into() };
        assert_eq!(UrlFailure::from_fetch(&cancelled, false).kind, FailureKind::Cancelled);
    }
}
