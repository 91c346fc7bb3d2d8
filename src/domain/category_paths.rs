//! Store category paths discovered on category pages
//!
//! Each path is a candidate for the mapping table. It becomes a mapping only
//! through curator approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::breadcrumb::{BreadcrumbSourceKind, NormalizedPath};
use crate::domain::canonical::CanonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "canon_id", rename_all = "snake_case")]
pub enum CandidateStatus {
    Candidate,
    Approved(CanonId),
}

impl CandidateStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Approved(_) => "approved",
        }
    }
}

/// One row of `store_category_paths`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCategoryPath {
    pub store_id: String,
    pub raw: String,
    pub normalized: NormalizedPath,
    pub depth: usize,
    pub example_url: String,
    pub source_kind: BreadcrumbSourceKind,
    pub occurrences: u64,
    pub status: CandidateStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
