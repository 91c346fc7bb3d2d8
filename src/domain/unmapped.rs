//! Unmapped review queue records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::CanonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Resolved,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Which approval closed a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResolution {
    pub canon_id: CanonId,
    pub entry_id: Uuid,
    pub resolved_at: DateTime<Utc>,
}

/// One row of `unmapped_review_queue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedRecord {
    pub normalized_path: NormalizedPath,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub occurrence_count: u64,
    pub status: ReviewStatus,
    /// Distinct URLs in first-seen order, capped by the ledger.
    pub example_urls: Vec<String>,
    pub resolution: Option<RecordResolution>,
}

impl UnmappedRecord {
    pub fn new(normalized_path: NormalizedPath, seen_at: DateTime<Utc>) -> Self {
        Self {
            normalized_path,
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            occurrence_count: 0,
            status: ReviewStatus::Pending,
            example_urls: Vec::new(),
            resolution: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }
}
