//! Canonical categories
//!
//! The taxonomy is built once, validated, and then only ever shared behind an
//! `Arc`. Every `CanonId` that leaves the resolver was checked against it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::constants::taxonomy::{CANONICAL_CATEGORY_COUNT, FIRST_CANON_ID};
use crate::domain::errors::{CanonError, CanonResult};

/// Identifier of one canonical category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonId(u16);

impl CanonId {
    /// Wraps a raw id without checking membership.
    ///
    /// Use [`CanonicalTaxonomy::canon_id`] when the id comes from outside.
    #[must_use]
    pub const fn new_unchecked(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CanonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 캐노니컬 카테고리 (canonical_categories 테이블의 한 행)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCategory {
    pub canon_id: CanonId,
    pub name: String,
    pub parent_id: Option<CanonId>,
}

impl CanonicalCategory {
    pub fn new(canon_id: u16, name: impl Into<String>, parent_id: Option<u16>) -> Self {
        Self {
            canon_id: CanonId(canon_id),
            name: name.into(),
            parent_id: parent_id.map(CanonId),
        }
    }
}

/// The closed canonical category set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTaxonomy {
    categories: BTreeMap<CanonId, CanonicalCategory>,
}

impl CanonicalTaxonomy {
    /// Builds a taxonomy of exactly [`CANONICAL_CATEGORY_COUNT`] members.
    pub fn new(categories: Vec<CanonicalCategory>) -> CanonResult<Self> {
        Self::with_expected_size(categories, CANONICAL_CATEGORY_COUNT)
    }

    /// Builds a taxonomy, requiring ids to be exactly `1..=expected_size`.
    ///
    /// Parents must be members and the parent relation must be acyclic.
    pub fn with_expected_size(
        categories: Vec<CanonicalCategory>,
        expected_size: usize,
    ) -> CanonResult<Self> {
        if categories.len() != expected_size {
            return Err(CanonError::TaxonomyInvalid {
                reason: format!(
                    "expected {expected_size} categories, got {}",
                    categories.len()
                ),
            });
        }

        let mut by_id = BTreeMap::new();
        for category in categories {
            if category.name.trim().is_empty() {
                return Err(CanonError::TaxonomyInvalid {
                    reason: format!("canon_id {} has an empty name", category.canon_id),
                });
            }
            let id = category.canon_id;
            if by_id.insert(id, category).is_some() {
                return Err(CanonError::TaxonomyInvalid {
                    reason: format!("canon_id {id} appears twice"),
                });
            }
        }

        let last = FIRST_CANON_ID as usize + expected_size - 1;
        for (expected, id) in (FIRST_CANON_ID as usize..=last).zip(by_id.keys()) {
            if id.0 as usize != expected {
                return Err(CanonError::TaxonomyInvalid {
                    reason: format!("canon_ids must be contiguous from {FIRST_CANON_ID}; missing {expected}"),
                });
            }
        }

        let taxonomy = Self { categories: by_id };
        taxonomy.check_parents()?;
        Ok(taxonomy)
    }

    fn check_parents(&self) -> CanonResult<()> {
        for category in self.categories.values() {
            let mut seen = BTreeSet::new();
            seen.insert(category.canon_id);
            let mut cursor = category.parent_id;
            while let Some(parent) = cursor {
                let Some(parent_category) = self.categories.get(&parent) else {
                    return Err(CanonError::TaxonomyInvalid {
                        reason: format!(
                            "canon_id {} has unknown parent {parent}",
                            category.canon_id
                        ),
                    });
                };
                if !seen.insert(parent) {
                    return Err(CanonError::TaxonomyInvalid {
                        reason: format!("parent cycle through canon_id {parent}"),
                    });
                }
                cursor = parent_category.parent_id;
            }
        }
        Ok(())
    }

    /// Validates a raw id against the closed set.
    pub fn canon_id(&self, raw: u16) -> CanonResult<CanonId> {
        let id = CanonId(raw);
        if self.categories.contains_key(&id) {
            Ok(id)
        } else {
            Err(CanonError::UnknownCanonId(raw))
        }
    }

    pub fn contains(&self, id: CanonId) -> bool {
        self.categories.contains_key(&id)
    }

    pub fn get(&self, id: CanonId) -> Option<&CanonicalCategory> {
        self.categories.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = CanonId> + '_ {
        self.categories.keys().copied()
    }

    pub fn categories(&self) -> impl Iterator<Item = &CanonicalCategory> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
