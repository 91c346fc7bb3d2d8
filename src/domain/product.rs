//! Product records and their resolution state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::CanonId;

/// Why a product has no canon id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReason {
    /// The page yielded no breadcrumb or structured category data.
    NoBreadcrumb,
    /// A breadcrumb was found but no prefix of it is mapped.
    NoMatchingPrefix,
}

impl UnmappedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoBreadcrumb => "no_breadcrumb",
            Self::NoMatchingPrefix => "no_matching_prefix",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_breadcrumb" => Some(Self::NoBreadcrumb),
            "no_matching_prefix" => Some(Self::NoMatchingPrefix),
            _ => None,
        }
    }
}

/// Every product is in exactly one of these states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ResolutionState {
    Resolved(CanonId),
    Unmapped(UnmappedReason),
}

impl ResolutionState {
    pub fn canon_id(self) -> Option<CanonId> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Unmapped(_) => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Column value for `products.resolution_state`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Unmapped(reason) => reason.as_str(),
        }
    }
}

/// Identity of a product across crawl runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub store_id: String,
    pub store_product_id: String,
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.store_id, self.store_product_id)
    }
}

/// 상품 (products 테이블의 한 행)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub store_id: String,
    pub store_product_id: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub source_url: String,
    pub breadcrumb_path_norm: Option<NormalizedPath>,
    pub resolution_state: ResolutionState,
    pub scraped_at: DateTime<Utc>,
}

impl Product {
    pub fn key(&self) -> ProductKey {
        ProductKey {
            store_id: self.store_id.clone(),
            store_product_id: self.store_product_id.clone(),
        }
    }

    /// Nullable `canon_id` column, derived from the state so the two never disagree.
    pub fn canon_id(&self) -> Option<CanonId> {
        self.resolution_state.canon_id()
    }
}
