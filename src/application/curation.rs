//! Curator approvals
//!
//! Commits an approval in memory through the review ledger, then persists the
//! new history rows, resolved queue records and category candidate status.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::info;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::mapping::{ApprovalSource, Provenance};
use crate::domain::repositories::CatalogStore;
use crate::domain::services::breadcrumb_normalizer::normalize_raw;
use crate::domain::services::{ApprovalReceipt, StoreCategoryPathRegistry, UnmappedReviewLedger};

/// 큐레이터 승인 요청
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    /// Raw or already normalized path, e.g. `Grocery > Dairy & Eggs`.
    pub path: String,
    pub canon_id: u16,
    pub approved_by: String,
    pub confidence: Option<f32>,
    pub note: Option<String>,
    pub allow_override: bool,
}

impl ApprovalRequest {
    pub fn new(path: impl Into<String>, canon_id: u16, approved_by: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            canon_id,
            approved_by: approved_by.into(),
            confidence: None,
            note: None,
            allow_override: false,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    fn provenance(&self, source: ApprovalSource) -> Provenance {
        let provenance = Provenance::new(self.approved_by.clone(), source);
        match &self.note {
            Some(note) => provenance.with_note(note.clone()),
            None => provenance,
        }
    }
}

pub struct CurationService {
    ledger: Arc<UnmappedReviewLedger>,
    registry: Arc<StoreCategoryPathRegistry>,
    store: Arc<dyn CatalogStore>,
}

impl CurationService {
    pub fn new(
        ledger: Arc<UnmappedReviewLedger>,
        registry: Arc<StoreCategoryPathRegistry>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        Self { ledger, registry, store }
    }

    /// Approves a path from the unmapped review queue.
    pub async fn approve_unmapped(&self, request: &ApprovalRequest) -> Result<ApprovalReceipt> {
        let path = normalize_raw(&request.path);
        self.approve(&path, request, ApprovalSource::LedgerResolution).await
    }

    /// Approves a category-page candidate seen for `store_id`.
    pub async fn approve_candidate(&self, store_id: &str, request: &ApprovalRequest) -> Result<ApprovalReceipt> {
        let key = normalize_raw(&request.path);
        let candidate = self
            .registry
            .get(store_id, key.as_key())
            .ok_or_else(|| anyhow!("No category candidate '{}' for store {}", key, store_id))?;
        self.approve(&candidate.normalized, request, ApprovalSource::CategoryCandidate)
            .await
    }

    /// Bulk-loads curated mappings. Stops at the first rejected row.
    pub async fn import(&self, requests: &[ApprovalRequest]) -> Result<Vec<ApprovalReceipt>> {
        let mut receipts = Vec::with_capacity(requests.len());
        for request in requests {
            let path = normalize_raw(&request.path);
            let receipt = self
                .approve(&path, request, ApprovalSource::Import)
                .await
                .with_context(|| format!("Import stopped at '{}'", request.path))?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    async fn approve(
        &self,
        path: &NormalizedPath,
        request: &ApprovalRequest,
        source: ApprovalSource,
    ) -> Result<ApprovalReceipt> {
        let canon_id = self.ledger.table().taxonomy().canon_id(request.canon_id)?;
        let receipt = self.ledger.approve_with_confidence(
            path,
            canon_id,
            request.confidence,
            request.provenance(source),
            request.allow_override,
        )?;

        if receipt.changed {
            // The unique active-path index needs the old row closed first
            if let Some(old) = &receipt.superseded {
                self.store
                    .mark_superseded(old)
                    .await
                    .context("Failed to persist superseded mapping")?;
            }
            self.store
                .append_entry(&receipt.entry)
                .await
                .context("Failed to persist mapping entry")?;
        }
        if !receipt.resolved_records.is_empty() {
            self.store
                .upsert_records(&receipt.resolved_records)
                .await
                .context("Failed to persist resolved queue records")?;
        }

        let approved_paths: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .filter(|p| p.normalized == *path)
            .filter_map(|p| self.registry.mark_approved(&p.store_id, path, canon_id))
            .collect();
        if !approved_paths.is_empty() {
            self.store
                .upsert_paths(&approved_paths)
                .await
                .context("Failed to persist category candidate status")?;
        }

        info!(
            path = path.as_key(),
            canon_id = %canon_id,
            source = source.as_str(),
            changed = receipt.changed,
            superseded = receipt.superseded.is_some(),
            resolved = receipt.resolved_records.len(),
            mapping_version = receipt.snapshot.version(),
            "Mapping approved"
        );
        Ok(receipt)
    }
}
