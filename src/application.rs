//! Application layer module
//!
//! Use cases that orchestrate the domain services: crawl runs, curation,
//! coverage audits and record export.

pub mod curation;
pub mod dto;
pub mod export;
pub mod pipeline;
pub mod use_cases;

pub use curation::{ApprovalRequest, CurationService};
pub use dto::{QueueItem, RunSummary};
pub use export::{ExportFormat, export_all};
pub use pipeline::{CatalogPipeline, FailureKind, PipelineSettings, RunOutcome, RunStatus, UrlFailure};
pub use use_cases::{CatalogContext, RunReport, read_taxonomy_file};
