//! Canonical Mapping Resolver
//!
//! Pure lookup of a normalized path against a [`MappingSnapshot`], with prefix
//! fallback from the most specific depth down to the configured minimum.
//! Nothing here mutates; recording unmapped paths is the caller's job.

use serde::{Deserialize, Serialize};

use crate::domain::breadcrumb::NormalizedPath;
use crate::domain::canonical::CanonId;
use crate::domain::constants::resolution::DEFAULT_MIN_DEPTH;
use crate::domain::mapping::MappingSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Shallowest prefix tried during fallback.
    pub min_depth: usize,
    /// Leading department segments dropped before prefix fallback.
    pub root_segments_to_drop: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_depth: DEFAULT_MIN_DEPTH,
            root_segments_to_drop: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Resolved {
        canon_id: CanonId,
        /// Key of the mapping entry that matched.
        matched_key: String,
    },
    Unmapped,
}

impl Resolution {
    pub fn canon_id(&self) -> Option<CanonId> {
        match self {
            Self::Resolved { canon_id, .. } => Some(*canon_id),
            Self::Unmapped => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MappingResolver {
    config: ResolverConfig,
}

impl MappingResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config: ResolverConfig {
                min_depth: config.min_depth.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Keys tried for `path`, most specific first.
    ///
    /// The full path comes first. Then prefixes of the path without its first
    /// `root_segments_to_drop` segments, from longest down to `min_depth`.
    pub fn candidate_keys(&self, path: &NormalizedPath) -> Vec<String> {
        if path.is_empty() {
            return Vec::new();
        }

        let mut keys = vec![path.as_key().to_string()];
        let skip = self.config.root_segments_to_drop;
        let remaining = path.depth().saturating_sub(skip);

        let mut depth = remaining;
        while depth >= self.config.min_depth && depth > 0 {
            if let Some(key) = path.key_of(skip, depth) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            depth -= 1;
        }
        keys
    }

    /// Resolves `path` against `snapshot`. The first (most specific) hit wins.
    pub fn resolve(&self, path: &NormalizedPath, snapshot: &MappingSnapshot) -> Resolution {
        for key in self.candidate_keys(path) {
            if let Some(canon_id) = snapshot.lookup(&key) {
                return Resolution::Resolved {
                    canon_id,
                    matched_key: key,
                };
            }
        }
        Resolution::Unmapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical::{CanonicalCategory, CanonicalTaxonomy};
    use crate::domain::mapping::{ApprovalSource, MappingApproval, MappingTable, Provenance};
    use crate::domain::services::breadcrumb_normalizer::{from_key, normalize_raw};
    use std::sync::Arc;

    fn table_with(entries: &[(&str, u16)]) -> MappingTable {
        let categories = (1..=113)
            .map(|id| CanonicalCategory::new(id, format!("C{id}"), None))
            .collect();
        let table = MappingTable::new(Arc::new(CanonicalTaxonomy::new(categories).unwrap()));
        for (key, id) in entries {
            table
                .approve(
                    MappingApproval {
                        normalized_path: from_key(key),
                        canon_id: CanonId::new_unchecked(*id),
                        confidence: None,
                        provenance: Provenance::new("test", ApprovalSource::Import),
                    },
                    false,
                )
                .unwrap();
        }
        table
    }

    #[test]
    fn test_most_specific_match_wins() {
        let table = table_with(&[("grocery>dairy and eggs>milk", 12), ("grocery>dairy and eggs", 7)]);
        let resolver = MappingResolver::default();
        let result = resolver.resolve(&from_key("grocery>dairy and eggs>milk"), &table.snapshot());
        assert_eq!(result.canon_id(), Some(CanonId::new_unchecked(12)));
    }

    #[test]
    fn test_prefix_fallback() {
        let table = table_with(&[("grocery>dairy and eggs", 7)]);
        let resolver = MappingResolver::default();
        let result = resolver.resolve(&from_key("grocery>dairy and eggs>milk>2%"), &table.snapshot());
        assert_eq!(
            result,
            Resolution::Resolved {
                canon_id: CanonId::new_unchecked(7),
                matched_key: "grocery>dairy and eggs".to_string(),
            }
        );
    }

    #[test]
    fn test_min_depth_limits_fallback() {
        let table = table_with(&[("grocery", 1)]);
        let resolver = MappingResolver::new(ResolverConfig {
            min_depth: 2,
            root_segments_to_drop: 0,
        });
        let result = resolver.resolve(&from_key("grocery>frozen"), &table.snapshot());
        assert_eq!(result, Resolution::Unmapped);
    }

    #[test]
    fn test_root_segment_drop() {
        let table = table_with(&[("dairy and eggs>milk", 12)]);
        let resolver = MappingResolver::new(ResolverConfig {
            min_depth: 1,
            root_segments_to_drop: 1,
        });
        let path = normalize_raw("Grocery > Dairy & Eggs > Milk");
        assert_eq!(path.as_key(), "grocery>dairy and eggs>milk");
        assert_eq!(
            resolver.candidate_keys(&path),
            vec!["grocery>dairy and eggs>milk", "dairy and eggs>milk", "dairy and eggs"]
        );
        assert_eq!(
            resolver.resolve(&path, &table.snapshot()).canon_id(),
            Some(CanonId::new_unchecked(12))
        );
    }

    #[test]
    fn test_empty_path_is_unmapped() {
        let table = table_with(&[("grocery", 1)]);
        let resolver = MappingResolver::default();
        assert_eq!(resolver.resolve(&from_key(""), &table.snapshot()), Resolution::Unmapped);
    }

    #[test]
    fn test_zero_min_depth_is_clamped() {
        let resolver = MappingResolver::new(ResolverConfig {
            min_depth: 0,
            root_segments_to_drop: 0,
        });
        assert_eq!(resolver.config().min_depth, 1);
        assert_eq!(resolver.candidate_keys(&from_key("a>b")), vec!["a>b", "a"]);
    }
}
