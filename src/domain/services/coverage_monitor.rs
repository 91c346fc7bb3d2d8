//! Coverage & Stability Monitor
//!
//! Batch audits run between crawl runs. Coverage summarises one run; stability
//! compares two runs and reports canon id changes that no curated mapping
//! change explains. Nothing here corrects anything.

use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::domain::canonical::CanonicalTaxonomy;
use crate::domain::coverage::{
    CoverageSnapshot, DriftCause, DriftFlag, ProductAssignment, StabilityReport,
};
use crate::domain::mapping::MappingSnapshot;
use crate::domain::product::{Product, ProductKey, ResolutionState};
use crate::domain::services::mapping_resolver::MappingResolver;

/// Upper bound on drift flags echoed to the log.
const LOGGED_DRIFT_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageMonitor {
    resolver: MappingResolver,
}

impl CoverageMonitor {
    pub fn new(resolver: MappingResolver) -> Self {
        Self { resolver }
    }

    /// Coverage of one run.
    ///
    /// A product listed more than once counts once, using its latest scrape.
    pub fn compute_coverage(
        &self,
        run_id: &str,
        products: &[Product],
        taxonomy: &CanonicalTaxonomy,
        mapping_version: u64,
    ) -> CoverageSnapshot {
        let mut latest: BTreeMap<ProductKey, &Product> = BTreeMap::new();
        for product in products {
            let key = product.key();
            match latest.get(&key) {
                Some(existing) if existing.scraped_at > product.scraped_at => {}
                _ => {
                    latest.insert(key, product);
                }
            }
        }

        let mut per_canon_id_counts: BTreeMap<_, usize> = taxonomy.ids().map(|id| (id, 0)).collect();
        let mut unmapped_by_reason = BTreeMap::new();
        let mut resolved_products = 0usize;
        let mut assignments = Vec::with_capacity(latest.len());

        for (key, product) in latest {
            match product.resolution_state {
                ResolutionState::Resolved(canon_id) => {
                    resolved_products += 1;
                    match per_canon_id_counts.get_mut(&canon_id) {
                        Some(count) => *count += 1,
                        None => warn!(product = %key, %canon_id, "Product carries a canon_id outside the taxonomy"),
                    }
                }
                ResolutionState::Unmapped(reason) => {
                    *unmapped_by_reason.entry(reason).or_insert(0usize) += 1;
                }
            }
            assignments.push(ProductAssignment {
                key,
                path: product.breadcrumb_path_norm.clone(),
                state: product.resolution_state,
            });
        }

        let total_products = assignments.len();
        let percent_labelled = if total_products == 0 {
            0.0
        } else {
            resolved_products as f64 * 100.0 / total_products as f64
        };
        let zero_count_ids: Vec<_> = per_canon_id_counts
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        info!(
            run_id,
            total = total_products,
            resolved = resolved_products,
            percent_labelled,
            zero_count_categories = zero_count_ids.len(),
            "Coverage computed"
        );

        CoverageSnapshot {
            run_id: run_id.to_string(),
            percent_labelled,
            total_products,
            resolved_products,
            unmapped_products: total_products - resolved_products,
            per_canon_id_counts,
            zero_count_ids,
            unmapped_by_reason,
            mapping_version,
            assignments,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Compares two runs.
    ///
    /// A changed canon id is explained when `mapping` holds an entry approved
    /// after `previous` and no later than `current` whose key is a resolution
    /// candidate of the product's previous or current path.
    pub fn compute_stability(
        &self,
        previous: &CoverageSnapshot,
        current: &CoverageSnapshot,
        mapping: &MappingSnapshot,
    ) -> StabilityReport {
        let approved_keys: HashSet<&str> = mapping
            .approved_between(previous.timestamp, current.timestamp)
            .map(|e| e.normalized_path.as_key())
            .collect();

        let mut compared = 0usize;
        let mut changed = 0usize;
        let mut explained = 0usize;
        let mut drift_flags = Vec::new();

        for now in &current.assignments {
            let Some(before) = previous.assignment(&now.key) else {
                continue;
            };
            compared += 1;
            if before.state.canon_id() == now.state.canon_id() {
                continue;
            }
            changed += 1;

            if self.is_explained(before, now, &approved_keys) {
                explained += 1;
                continue;
            }

            let cause = if before.path == now.path {
                DriftCause::ResolutionRegression
            } else {
                DriftCause::BreadcrumbChanged
            };
            drift_flags.push(DriftFlag {
                key: now.key.clone(),
                previous: before.state.canon_id(),
                current: now.state.canon_id(),
                previous_path: before.path.clone(),
                current_path: now.path.clone(),
                cause,
            });
        }

        let appeared = current
            .assignments
            .iter()
            .filter(|a| previous.assignment(&a.key).is_none())
            .count();
        let disappeared = previous
            .assignments
            .iter()
            .filter(|a| current.assignment(&a.key).is_none())
            .count();

        info!(
            previous = %previous.run_id,
            current = %current.run_id,
            compared,
            changed,
            explained,
            drift = drift_flags.len(),
            "Stability computed"
        );
        for flag in drift_flags.iter().take(LOGGED_DRIFT_SAMPLES) {
            warn!(
                product = %flag.key,
                previous = ?flag.previous,
                current = ?flag.current,
                cause = ?flag.cause,
                "Unexplained canon_id drift"
            );
        }

        StabilityReport {
            previous_run_id: previous.run_id.clone(),
            current_run_id: current.run_id.clone(),
            compared_products: compared,
            changed_products: changed,
            explained_changes: explained,
            drift_flags,
            appeared,
            disappeared,
        }
    }

    fn is_explained(
        &self,
        before: &ProductAssignment,
        now: &ProductAssignment,
        approved_keys: &HashSet<&str>,
    ) -> bool {
        if approved_keys.is_empty() {
            return false;
        }
        [before.path.as_ref(), now.path.as_ref()]
            .into_iter()
            .flatten()
            .flat_map(|path| self.resolver.candidate_keys(path))
            .any(|key| approved_keys.contains(key.as_str()))
    }
}
