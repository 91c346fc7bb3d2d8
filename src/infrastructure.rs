//! Infrastructure layer for configuration, logging, parsing and persistence
//!
//! Adapters behind the domain ports: SQLite repositories, HTML/structured-data
//! and sitemap parsing, and an offline page source.

pub mod config;
pub mod database_connection;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod repositories;
pub mod sitemap_parser;
pub mod snapshot_fetcher;

// Re-export commonly used items
pub use config::{CanonConfig, ConfigError, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{ParsingError, ParsingResult, ProductPage, ProductPageParser};
pub use repositories::SqliteCatalogRepository;
pub use sitemap_parser::{SitemapFilter, extract_sitemaps_from_robots, parse_sitemap};
pub use snapshot_fetcher::{SnapshotEntry, SnapshotFetcher};
