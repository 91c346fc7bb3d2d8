//! Coverage and stability report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::CanonId;
use crate::domain::product::{ProductKey, ResolutionState, UnmappedReason};

/// Per-product outcome kept in a snapshot for later stability comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAssignment {
    pub key: ProductKey,
    pub path: Option<NormalizedPath>,
    pub state: ResolutionState,
}

/// 크롤링 실행 한 번의 커버리지 (coverage_reports 테이블)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub run_id: String,
    /// Percentage in `[0, 100]`.
    pub percent_labelled: f64,
    pub total_products: usize,
    pub resolved_products: usize,
    pub unmapped_products: usize,
    /// Every canon id of the taxonomy, including those with zero products.
    pub per_canon_id_counts: BTreeMap<CanonId, usize>,
    pub zero_count_ids: Vec<CanonId>,
    pub unmapped_by_reason: BTreeMap<UnmappedReason, usize>,
    /// Mapping snapshot version the products were resolved against.
    pub mapping_version: u64,
    pub assignments: Vec<ProductAssignment>,
    pub timestamp: DateTime<Utc>,
}

impl CoverageSnapshot {
    pub fn assignment(&self, key: &ProductKey) -> Option<&ProductAssignment> {
        self.assignments
            .binary_search_by(|a| a.key.cmp(key))
            .ok()
            .and_then(|i| self.assignments.get(i))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCause {
    /// The product's normalized breadcrumb differs between runs.
    BreadcrumbChanged,
    /// Same breadcrumb, different outcome with no curated change to explain it.
    ResolutionRegression,
}

/// A product whose canon id moved between runs without a curated mapping change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftFlag {
    pub key: ProductKey,
    pub previous: Option<CanonId>,
    pub current: Option<CanonId>,
    pub previous_path: Option<NormalizedPath>,
    pub current_path: Option<NormalizedPath>,
    pub cause: DriftCause,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub previous_run_id: String,
    pub current_run_id: String,
    pub compared_products: usize,
    pub changed_products: usize,
    /// Changes accounted for by a mapping approval between the two runs.
    pub explained_changes: usize,
    pub drift_flags: Vec<DriftFlag>,
    pub appeared: usize,
    pub disappeared: usize,
}

impl StabilityReport {
    pub fn is_stable(&self) -> bool {
        self.drift_flags.is_empty()
    }
}

/// Combined `coverage_report` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub coverage: CoverageSnapshot,
    pub stability: Option<StabilityReport>,
}
