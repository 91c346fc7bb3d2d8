//! In-memory registry of store category paths
//!
//! Category pages contribute candidate paths. The registry only collects them;
//! turning a candidate into a mapping goes through the review ledger's approve.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::breadcrumb::{NormalizedPath, RawBreadcrumb};
use crate::domain::canonical::CanonId;
use crate::domain::category_paths::{CandidateStatus, StoreCategoryPath};
use crate::domain::services::breadcrumb_normalizer::normalize_breadcrumb;

type RegistryKey = (String, String);

#[derive(Default)]
pub struct StoreCategoryPathRegistry {
    paths: Mutex<HashMap<RegistryKey, StoreCategoryPath>>,
}

impl StoreCategoryPathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RegistryKey, StoreCategoryPath>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn restore(&self, paths: Vec<StoreCategoryPath>) {
        let mut guard = self.lock();
        for path in paths {
            guard.insert((path.store_id.clone(), path.normalized.as_key().to_string()), path);
        }
    }

    /// Records a breadcrumb seen on a category page. Returns `None` when it normalizes to nothing.
    pub fn observe(
        &self,
        store_id: &str,
        breadcrumb: &RawBreadcrumb,
        url: &str,
        seen_at: DateTime<Utc>,
    ) -> Option<StoreCategoryPath> {
        let normalized = normalize_breadcrumb(breadcrumb);
        if normalized.is_empty() {
            return None;
        }

        let mut guard = self.lock();
        let entry = guard
            .entry((store_id.to_string(), normalized.as_key().to_string()))
            .or_insert_with(|| StoreCategoryPath {
                store_id: store_id.to_string(),
                raw: breadcrumb.joined(),
                depth: normalized.depth(),
                normalized: normalized.clone(),
                example_url: url.to_string(),
                source_kind: breadcrumb.source_kind,
                occurrences: 0,
                status: CandidateStatus::Candidate,
                first_seen_at: seen_at,
                last_seen_at: seen_at,
            });
        entry.occurrences += 1;
        entry.last_seen_at = entry.last_seen_at.max(seen_at);
        Some(entry.clone())
    }

    pub fn mark_approved(&self, store_id: &str, path: &NormalizedPath, canon_id: CanonId) -> Option<StoreCategoryPath> {
        let mut guard = self.lock();
        let entry = guard.get_mut(&(store_id.to_string(), path.as_key().to_string()))?;
        entry.status = CandidateStatus::Approved(canon_id);
        Some(entry.clone())
    }

    pub fn get(&self, store_id: &str, key: &str) -> Option<StoreCategoryPath> {
        self.lock().get(&(store_id.to_string(), key.to_string())).cloned()
    }

    /// Unapproved candidates, most frequent first.
    pub fn candidates(&self) -> Vec<StoreCategoryPath> {
        let mut out: Vec<_> = self
            .lock()
            .values()
            .filter(|p| p.status == CandidateStatus::Candidate)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.store_id.cmp(&b.store_id))
                .then_with(|| a.normalized.cmp(&b.normalized))
        });
        out
    }

    pub fn all(&self) -> Vec<StoreCategoryPath> {
        let mut out: Vec<_> = self.lock().values().cloned().collect();
        out.sort_by(|a, b| (&a.store_id, &a.normalized).cmp(&(&b.store_id, &b.normalized)));
        out
    }
}
