//! Data transfer objects printed by the CLI and written next to exports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::application::pipeline::{FailureKind, RunOutcome, RunStatus};
use crate::domain::coverage::CoverageReport;
use crate::domain::discovery::UrlClass;

/// Per-run counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub mapping_version: u64,
    pub discovered_urls: usize,
    pub urls_by_class: BTreeMap<UrlClass, usize>,
    pub ambiguous_urls: usize,
    pub products: usize,
    pub resolved_products: usize,
    pub unmapped_products: usize,
    pub category_paths: usize,
    pub pending_review_paths: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
    pub percent_labelled: Option<f64>,
    pub drift_flags: Option<usize>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome, report: Option<&CoverageReport>) -> Self {
        let mut urls_by_class = BTreeMap::new();
        for record in &outcome.classifications {
            *urls_by_class.entry(record.class).or_insert(0) += 1;
        }
        let mut failures_by_kind = BTreeMap::new();
        for failure in &outcome.failures {
            *failures_by_kind.entry(failure_label(failure.kind).to_string()).or_insert(0) += 1;
        }
        let resolved_products = outcome
            .products
            .iter()
            .filter(|p| p.resolution_state.is_resolved())
            .count();

        Self {
            run_id: outcome.run_id.clone(),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            status: outcome.status.clone(),
            mapping_version: outcome.mapping_version,
            discovered_urls: outcome.classifications.len(),
            urls_by_class,
            ambiguous_urls: outcome
                .classifications
                .iter()
                .filter(|r| r.reason.is_ambiguous())
                .count(),
            products: outcome.products.len(),
            resolved_products,
            unmapped_products: outcome.products.len() - resolved_products,
            category_paths: outcome.category_paths.len(),
            pending_review_paths: outcome.unmapped.iter().filter(|r| r.is_pending()).count(),
            failures_by_kind,
            percent_labelled: report.map(|r| r.coverage.percent_labelled),
            drift_flags: report.and_then(|r| r.stability.as_ref()).map(|s| s.drift_flags.len()),
        }
    }
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::SitemapFetch => "sitemap_fetch",
        FailureKind::SitemapParse => "sitemap_parse",
        FailureKind::PageFetch => "page_fetch",
        FailureKind::PageParse => "page_parse",
        FailureKind::Cancelled => "cancelled",
    }
}

/// One line of the review queue listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub normalized_path: String,
    pub occurrence_count: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub example_url: Option<String>,
}

impl From<&crate::domain::unmapped::UnmappedRecord> for QueueItem {
    fn from(record: &crate::domain::unmapped::UnmappedRecord) -> Self {
        Self {
            normalized_path: record.normalized_path.as_key().to_string(),
            occurrence_count: record.occurrence_count,
            first_seen_at: record.first_seen_at,
            last_seen_at: record.last_seen_at,
            example_url: record.example_urls.first().cloned(),
        }
    }
}
