//! Breadcrumb value objects
//!
//! A breadcrumb arrives as an ordered list of raw segments from one of several
//! sources and leaves the normalizer as a [`NormalizedPath`], the mapping lookup key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::constants::breadcrumb::CANONICAL_SEPARATOR;

/// Where a breadcrumb was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbSourceKind {
    CategoryPage,
    ProductPage,
    StructuredData,
}

impl BreadcrumbSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CategoryPage => "category_page",
            Self::ProductPage => "product_page",
            Self::StructuredData => "structured_data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category_page" => Some(Self::CategoryPage),
            "product_page" => Some(Self::ProductPage),
            "structured_data" => Some(Self::StructuredData),
            _ => None,
        }
    }
}

/// Ordered breadcrumb segments exactly as extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBreadcrumb {
    pub segments: Vec<String>,
    pub source_kind: BreadcrumbSourceKind,
}

impl RawBreadcrumb {
    pub fn new(segments: Vec<String>, source_kind: BreadcrumbSourceKind) -> Self {
        Self {
            segments,
            source_kind,
        }
    }

    /// Display form used for the `raw` column ("Grocery > Dairy & Eggs").
    pub fn joined(&self) -> String {
        self.segments.join(" > ")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.trim().is_empty())
    }
}

/// Breadcrumb after canonicalisation
///
/// Only the normalizer builds these, so `key` always equals the segments
/// joined with [`CANONICAL_SEPARATOR`] and no segment is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedPath {
    key: String,
    segments: Vec<String>,
}

impl NormalizedPath {
    pub(crate) fn from_normalized_segments(segments: Vec<String>) -> Self {
        let key = join_segments(&segments);
        Self { key, segments }
    }

    /// Lookup key, e.g. `grocery>dairy and eggs>milk`.
    pub fn as_key(&self) -> &str {
        &self.key
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of non-empty segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Key of the first `depth` segments of `segments[skip..]`.
    pub fn key_of(&self, skip: usize, depth: usize) -> Option<String> {
        let end = skip.checked_add(depth)?;
        if depth == 0 || end > self.segments.len() {
            return None;
        }
        Some(join_segments(&self.segments[skip..end]))
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

fn join_segments(segments: &[String]) -> String {
    let mut key = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            key.push(CANONICAL_SEPARATOR);
        }
        key.push_str(segment);
    }
    key
}

/// A breadcrumb observation with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbPath {
    pub raw: String,
    pub normalized: NormalizedPath,
    pub depth: usize,
    pub source_url: String,
    pub source_kind: BreadcrumbSourceKind,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> NormalizedPath {
        NormalizedPath::from_normalized_segments(segments.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_key_joins_with_canonical_separator() {
        let p = path(&["grocery", "dairy and eggs", "milk"]);
        assert_eq!(p.as_key(), "grocery>dairy and eggs>milk");
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn test_key_of_prefixes() {
        let p = path(&["grocery", "dairy and eggs", "milk"]);
        assert_eq!(p.key_of(0, 2).as_deref(), Some("grocery>dairy and eggs"));
        assert_eq!(p.key_of(1, 2).as_deref(), Some("dairy and eggs>milk"));
        assert_eq!(p.key_of(1, 3), None);
        assert_eq!(p.key_of(0, 0), None);
    }

    #[test]
    fn test_source_kind_round_trip_names() {
        for kind in [
            BreadcrumbSourceKind::CategoryPage,
            BreadcrumbSourceKind::ProductPage,
            BreadcrumbSourceKind::StructuredData,
        ] {
            assert_eq!(BreadcrumbSourceKind::parse(kind.as_str()), Some(kind));
        }
    }
}
