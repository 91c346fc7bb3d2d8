//! Unmapped Review Ledger
//!
//! Tracks paths that failed to resolve and owns the curator approval path into
//! the mapping table. Records are counted, never duplicated, and never deleted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::CanonId;
use crate::domain::constants::review::DEFAULT_MAX_EXAMPLE_URLS;
use crate::domain::errors::CanonResult;
use crate::domain::mapping::{
    MappingApproval, MappingEntry, MappingSnapshot, MappingTable, Provenance,
};
use crate::domain::services::mapping_resolver::{MappingResolver, Resolution};
use crate::domain::unmapped::{RecordResolution, ReviewStatus, UnmappedRecord};

/// Result of a successful approval
#[derive(Debug, Clone)]
pub struct ApprovalReceipt {
    pub entry: MappingEntry,
    pub superseded: Option<MappingEntry>,
    pub changed: bool,
    /// Records moved from pending to resolved by this approval.
    pub resolved_records: Vec<UnmappedRecord>,
    pub snapshot: Arc<MappingSnapshot>,
}

pub struct UnmappedReviewLedger {
    table: Arc<MappingTable>,
    resolver: MappingResolver,
    max_example_urls: usize,
    records: Mutex<HashMap<String, UnmappedRecord>>,
}

impl UnmappedReviewLedger {
    pub fn new(table: Arc<MappingTable>, resolver: MappingResolver) -> Self {
        Self::with_capacity(table, resolver, DEFAULT_MAX_EXAMPLE_URLS)
    }

    pub fn with_capacity(
        table: Arc<MappingTable>,
        resolver: MappingResolver,
        max_example_urls: usize,
    ) -> Self {
        Self {
            table,
            resolver,
            max_example_urls: max_example_urls.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Loads persisted records, e.g. at startup.
    pub fn restore(&self, records: Vec<UnmappedRecord>) {
        let mut guard = self.lock();
        for record in records {
            guard.insert(record.normalized_path.as_key().to_string(), record);
        }
        info!(records = guard.len(), "Unmapped review ledger restored");
    }

    pub fn table(&self) -> &Arc<MappingTable> {
        &self.table
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UnmappedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one unresolved lookup of `path` seen at `url`.
    pub fn record(&self, path: &NormalizedPath, url: &str) -> UnmappedRecord {
        self.record_at(path, url, Utc::now())
    }

    /// Counts one sighting. The path is checked against the live snapshot, so
    /// a worker resolving against an older snapshot cannot queue a path that
    /// an approval has mapped since.
    pub fn record_at(&self, path: &NormalizedPath, url: &str, seen_at: DateTime<Utc>) -> UnmappedRecord {
        let mut guard = self.lock();
        // Loaded under the lock: an approval swaps the snapshot before it sweeps pending records
        let snapshot = self.table.snapshot();
        let live = self.resolution_for(path, &snapshot, seen_at);

        let record = guard
            .entry(path.as_key().to_string())
            .or_insert_with(|| UnmappedRecord::new(path.clone(), seen_at));

        match (record.status, live) {
            (ReviewStatus::Pending, Some(resolution)) => {
                debug!(path = path.as_key(), canon_id = %resolution.canon_id, "Path mapped since lookup, resolving");
                record.status = ReviewStatus::Resolved;
                record.resolution = Some(resolution);
            }
            (ReviewStatus::Resolved, None) => {
                debug!(path = path.as_key(), "Resolved path no longer maps, reopening");
                record.status = ReviewStatus::Pending;
                record.resolution = None;
            }
            _ => {}
        }
        record.occurrence_count += 1;
        record.last_seen_at = record.last_seen_at.max(seen_at);
        if !url.is_empty()
            && record.example_urls.len() < self.max_example_urls
            && !record.example_urls.iter().any(|u| u == url)
        {
            record.example_urls.push(url.to_string());
        }
        record.clone()
    }

    fn resolution_for(
        &self,
        path: &NormalizedPath,
        snapshot: &MappingSnapshot,
        resolved_at: DateTime<Utc>,
    ) -> Option<RecordResolution> {
        let Resolution::Resolved { canon_id, matched_key } = self.resolver.resolve(path, snapshot) else {
            return None;
        };
        let entry = snapshot.active_entry(&matched_key)?;
        Some(RecordResolution {
            canon_id,
            entry_id: entry.entry_id,
            resolved_at,
        })
    }

    /// Approves `path -> canon_id` and resolves every pending record that the
    /// new snapshot now maps.
    pub fn approve(
        &self,
        path: &NormalizedPath,
        canon_id: CanonId,
        provenance: Provenance,
        allow_override: bool,
    ) -> CanonResult<ApprovalReceipt> {
        self.approve_with_confidence(path, canon_id, None, provenance, allow_override)
    }

    pub fn approve_with_confidence(
        &self,
        path: &NormalizedPath,
        canon_id: CanonId,
        confidence: Option<f32>,
        provenance: Provenance,
        allow_override: bool,
    ) -> CanonResult<ApprovalReceipt> {
        let outcome = self.table.approve(
            MappingApproval {
                normalized_path: path.clone(),
                canon_id,
                confidence,
                provenance,
            },
            allow_override,
        )?;

        let resolved_records = self.resolve_pending(&outcome.snapshot, outcome.entry.provenance.approved_at);
        if !resolved_records.is_empty() {
            info!(
                path = path.as_key(),
                canon_id = %canon_id,
                resolved = resolved_records.len(),
                "Unmapped records resolved by approval"
            );
        }

        Ok(ApprovalReceipt {
            entry: outcome.entry,
            superseded: outcome.superseded,
            changed: outcome.changed,
            resolved_records,
            snapshot: outcome.snapshot,
        })
    }

    fn resolve_pending(&self, snapshot: &MappingSnapshot, resolved_at: DateTime<Utc>) -> Vec<UnmappedRecord> {
        let mut guard = self.lock();
        let mut resolved = Vec::new();
        for record in guard.values_mut().filter(|r| r.is_pending()) {
            if let Some(resolution) = self.resolution_for(&record.normalized_path, snapshot, resolved_at) {
                record.status = ReviewStatus::Resolved;
                record.resolution = Some(resolution);
                resolved.push(record.clone());
            }
        }
        resolved.sort_by(|a, b| a.normalized_path.cmp(&b.normalized_path));
        resolved
    }

    pub fn get(&self, key: &str) -> Option<UnmappedRecord> {
        self.lock().get(key).cloned()
    }

    /// Pending records, most frequent first, then by path.
    pub fn pending_queue(&self) -> Vec<UnmappedRecord> {
        let mut pending: Vec<UnmappedRecord> =
            self.lock().values().filter(|r| r.is_pending()).cloned().collect();
        pending.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| a.normalized_path.cmp(&b.normalized_path))
        });
        pending
    }

    /// Every record, pending and resolved, ordered by path.
    pub fn all_records(&self) -> Vec<UnmappedRecord> {
        let mut all: Vec<UnmappedRecord> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.normalized_path.cmp(&b.normalized_path));
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
