//! Canonical mapping table
//!
//! The table is a function from normalized path key to [`CanonId`]. Entries are
//! appended through curator approval and superseded rather than overwritten.
//! Readers work from an immutable [`MappingSnapshot`]; each approval builds the
//! next snapshot in full and swaps it in with one atomic pointer store.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::{CanonId, CanonicalTaxonomy};
use crate::domain::errors::{CanonError, CanonResult};

/// How an approval reached the mapping table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSource {
    /// A path observed on a category page and proposed as a candidate.
    CategoryCandidate,
    /// A path that was pending in the unmapped review queue.
    LedgerResolution,
    /// Bulk import of a curated mapping file.
    Import,
}

impl ApprovalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CategoryCandidate => "category_candidate",
            Self::LedgerResolution => "ledger_resolution",
            Self::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category_candidate" => Some(Self::CategoryCandidate),
            "ledger_resolution" => Some(Self::LedgerResolution),
            "import" => Some(Self::Import),
            _ => None,
        }
    }
}

/// Who approved a mapping, when, and from where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub source: ApprovalSource,
    pub note: Option<String>,
}

impl Provenance {
    pub fn new(approved_by: impl Into<String>, source: ApprovalSource) -> Self {
        Self {
            approved_by: approved_by.into(),
            approved_at: Utc::now(),
            source,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn at(mut self, approved_at: DateTime<Utc>) -> Self {
        self.approved_at = approved_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MappingStatus {
    Active,
    Superseded { by: Uuid, at: DateTime<Utc> },
}

/// One row of `category_mapping`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub entry_id: Uuid,
    pub normalized_path: NormalizedPath,
    pub canon_id: CanonId,
    pub confidence: Option<f32>,
    pub provenance: Provenance,
    pub status: MappingStatus,
}

impl MappingEntry {
    pub fn is_active(&self) -> bool {
        matches!(self.status, MappingStatus::Active)
    }
}

/// A curator's request to map a path
#[derive(Debug, Clone)]
pub struct MappingApproval {
    pub normalized_path: NormalizedPath,
    pub canon_id: CanonId,
    pub confidence: Option<f32>,
    pub provenance: Provenance,
}

/// Result of a committed approval
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The entry active for the path after the commit.
    pub entry: MappingEntry,
    /// The previously active entry, now superseded.
    pub superseded: Option<MappingEntry>,
    /// `false` when the same mapping was already active and nothing changed.
    pub changed: bool,
    pub snapshot: Arc<MappingSnapshot>,
}

/// Immutable point-in-time view of the mapping table
#[derive(Debug, Clone)]
pub struct MappingSnapshot {
    version: u64,
    active: HashMap<String, usize>,
    history: Vec<MappingEntry>,
    digest: String,
}

impl MappingSnapshot {
    pub fn empty() -> Self {
        Self::build(0, Vec::new())
    }

    fn build(version: u64, history: Vec<MappingEntry>) -> Self {
        let active: HashMap<String, usize> = history
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_active())
            .map(|(i, e)| (e.normalized_path.as_key().to_string(), i))
            .collect();
        let digest = digest_of(&active, &history);
        Self {
            version,
            active,
            history,
            digest,
        }
    }

    /// Monotonic version; bumped by every committed change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// blake3 fingerprint of the active `(key, canon_id)` pairs.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn lookup(&self, key: &str) -> Option<CanonId> {
        self.active_entry(key).map(|e| e.canon_id)
    }

    pub fn active_entry(&self, key: &str) -> Option<&MappingEntry> {
        self.active.get(key).and_then(|&i| self.history.get(i))
    }

    pub fn active_entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.history.iter().filter(|e| e.is_active())
    }

    /// Every entry ever committed, in commit order.
    pub fn history(&self) -> &[MappingEntry] {
        &self.history
    }

    /// Entries approved in the half-open window `(after, until]`.
    pub fn approved_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Iterator<Item = &MappingEntry> {
        self.history
            .iter()
            .filter(move |e| e.provenance.approved_at > after && e.provenance.approved_at <= until)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for MappingSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

fn digest_of(active: &HashMap<String, usize>, history: &[MappingEntry]) -> String {
    let ordered: BTreeMap<&str, u16> = active
        .iter()
        .filter_map(|(k, &i)| history.get(i).map(|e| (k.as_str(), e.canon_id.get())))
        .collect();
    let mut hasher = blake3::Hasher::new();
    for (key, canon_id) in ordered {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(&canon_id.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Versioned holder of the active snapshot
pub struct MappingTable {
    taxonomy: Arc<CanonicalTaxonomy>,
    current: ArcSwap<MappingSnapshot>,
    writer: Mutex<()>,
}

impl MappingTable {
    pub fn new(taxonomy: Arc<CanonicalTaxonomy>) -> Self {
        Self {
            taxonomy,
            current: ArcSwap::from_pointee(MappingSnapshot::empty()),
            writer: Mutex::new(()),
        }
    }

    /// Rebuilds the table from persisted history rows.
    ///
    /// Every canon id must be a taxonomy member and at most one row per path may be active.
    pub fn from_history(
        taxonomy: Arc<CanonicalTaxonomy>,
        mut history: Vec<MappingEntry>,
    ) -> CanonResult<Self> {
        history.sort_by_key(|e| e.provenance.approved_at);

        let mut active_keys = HashMap::new();
        for entry in &history {
            if !taxonomy.contains(entry.canon_id) {
                return Err(CanonError::UnknownCanonId(entry.canon_id.get()));
            }
            if entry.is_active()
                && active_keys
                    .insert(entry.normalized_path.as_key().to_string(), entry.entry_id)
                    .is_some()
            {
                return Err(CanonError::DuplicateActiveMapping {
                    path: entry.normalized_path.as_key().to_string(),
                });
            }
        }

        let version = history.len() as u64;
        let snapshot = MappingSnapshot::build(version, history);
        info!(
            version = snapshot.version(),
            active = snapshot.active_len(),
            digest = %snapshot.digest(),
            "Mapping table restored from history"
        );
        Ok(Self {
            taxonomy,
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        })
    }

    pub fn taxonomy(&self) -> &Arc<CanonicalTaxonomy> {
        &self.taxonomy
    }

    /// Current snapshot. Hold on to it for the whole operation.
    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.current.load_full()
    }

    /// Commits a curator approval.
    ///
    /// A different active canon id for the same path is a [`CanonError::MappingConflict`]
    /// unless `allow_override` is set, in which case the old entry is superseded.
    pub fn approve(
        &self,
        approval: MappingApproval,
        allow_override: bool,
    ) -> CanonResult<ApprovalOutcome> {
        if approval.normalized_path.is_empty() {
            return Err(CanonError::EmptyPath);
        }
        if !self.taxonomy.contains(approval.canon_id) {
            return Err(CanonError::UnknownCanonId(approval.canon_id.get()));
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        let key = approval.normalized_path.as_key();

        let previous = current.active.get(key).copied();
        if let Some(index) = previous {
            let active = &current.history[index];
            if active.canon_id == approval.canon_id {
                debug!(path = key, canon_id = %active.canon_id, "Mapping already active");
                return Ok(ApprovalOutcome {
                    entry: active.clone(),
                    superseded: None,
                    changed: false,
                    snapshot: current,
                });
            }
            if !allow_override {
                return Err(CanonError::MappingConflict {
                    path: key.to_string(),
                    active: active.canon_id,
                    requested: approval.canon_id,
                });
            }
        }

        let entry = MappingEntry {
            entry_id: Uuid::new_v4(),
            normalized_path: approval.normalized_path,
            canon_id: approval.canon_id,
            confidence: approval.confidence,
            provenance: approval.provenance,
            status: MappingStatus::Active,
        };

        let mut history = current.history.clone();
        let superseded = previous.map(|index| {
            let old = &mut history[index];
            old.status = MappingStatus::Superseded {
                by: entry.entry_id,
                at: entry.provenance.approved_at,
            };
            old.clone()
        });
        history.push(entry.clone());

        let next = Arc::new(MappingSnapshot::build(current.version + 1, history));
        self.current.store(Arc::clone(&next));

        info!(
            path = entry.normalized_path.as_key(),
            canon_id = %entry.canon_id,
            version = next.version(),
            superseded = superseded.is_some(),
            "Mapping approved"
        );

        Ok(ApprovalOutcome {
            entry,
            superseded,
            changed: true,
            snapshot: next,
        })
    }
}
