//! Domain services
//!
//! Pure computations and in-memory state holders. Each is safe to share across
//! fetch workers.

pub mod breadcrumb_normalizer;
pub mod category_registry;
pub mod coverage_monitor;
pub mod mapping_resolver;
pub mod page_fetcher;
pub mod review_ledger;
pub mod url_classifier;

pub use category_registry::StoreCategoryPathRegistry;
pub use coverage_monitor::CoverageMonitor;
pub use mapping_resolver::{MappingResolver, Resolution, ResolverConfig};
pub use page_fetcher::{FetchError, FetchedPage, PageFetcher};
pub use review_ledger::{ApprovalReceipt, UnmappedReviewLedger};
pub use url_classifier::{ClassificationRules, UrlClassifier};
