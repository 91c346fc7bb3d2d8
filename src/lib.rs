//! Catalog Canon - sitemap-driven product categorisation
//!
//! Classifies discovered URLs, normalizes product breadcrumbs and resolves them
//! onto a closed canonical taxonomy through a curated, versioned mapping table.
//! Paths nothing maps to are queued for curators; coverage and run-to-run
//! stability are measured per crawl.

pub mod application;
pub mod domain;
pub mod infrastructure;
