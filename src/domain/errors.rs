//! Domain error types
//!
//! Only conditions that must reach a caller are errors. Ambiguous URL
//! classification and missing breadcrumbs are recorded outcomes instead.

use thiserror::Error;

use crate::domain::canonical::CanonId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanonError {
    #[error("Mapping conflict for '{path}': active canon_id {active}, requested {requested}")]
    MappingConflict {
        path: String,
        active: CanonId,
        requested: CanonId,
    },

    #[error("canon_id {0} is not a member of the canonical taxonomy")]
    UnknownCanonId(u16),

    #[error("Canonical taxonomy is invalid: {reason}")]
    TaxonomyInvalid { reason: String },

    #[error("More than one active mapping for '{path}'")]
    DuplicateActiveMapping { path: String },

    #[error("Normalized path is empty")]
    EmptyPath,
}

impl CanonError {
    /// Conflicts wait for a curator; the other variants indicate bad input or corrupted history.
    pub fn needs_curator(&self) -> bool {
        matches!(self, Self::MappingConflict { .. })
    }
}

pub type CanonResult<T> = Result<T, CanonError>;
