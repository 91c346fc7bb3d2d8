//! Domain module - catalog classification core
//!
//! Entities, value objects and the five core services: breadcrumb normalizer,
//! URL classifier, mapping resolver, unmapped review ledger and coverage monitor.
//! Nothing in here performs I/O.

pub mod breadcrumb;
pub mod canonical;
pub mod category_paths;
pub mod constants;
pub mod coverage;
pub mod discovery;
pub mod errors;
pub mod mapping;
pub mod product;
pub mod repositories;
pub mod services;
pub mod unmapped;

// Re-export commonly used items for convenience
pub use breadcrumb::{BreadcrumbPath, BreadcrumbSourceKind, NormalizedPath, RawBreadcrumb};
pub use canonical::{CanonId, CanonicalCategory, CanonicalTaxonomy};
pub use coverage::{CoverageReport, CoverageSnapshot, DriftCause, DriftFlag, StabilityReport};
pub use discovery::{ClassificationReason, ClassificationRecord, SitemapContext, UrlClass};
pub use errors::{CanonError, CanonResult};
pub use mapping::{ApprovalSource, MappingEntry, MappingSnapshot, MappingTable, Provenance};
pub use product::{Product, ProductKey, ResolutionState, UnmappedReason};
pub use unmapped::{ReviewStatus, UnmappedRecord};
