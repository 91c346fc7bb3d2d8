//! Configuration infrastructure
//!
//! `CanonConfig` is loaded from a file (toml/json/yaml by extension) layered
//! under `CATALOG_CANON_*` environment variables, then validated. Nested keys
//! use `__`, e.g. `CATALOG_CANON_RESOLVER__MIN_DEPTH=2`.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::domain::services::{ClassificationRules, ResolverConfig};

pub const ENV_PREFIX: &str = "CATALOG_CANON";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonConfig {
    pub taxonomy: TaxonomyConfig,
    pub classifier: ClassifierConfig,
    pub normalizer: NormalizerConfig,
    pub resolver: ResolverSettings,
    pub ledger: LedgerConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Size of the closed canonical set
    pub expected_size: usize,

    /// JSON file with the canonical categories to seed (`[{canon_id, name, parent_id}]`)
    pub categories_file: Option<PathBuf>,
}

/// URL classifier rules, as regular expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Hosts URLs must belong to. Empty means any host.
    pub allowed_hosts: Vec<String>,
    pub product_patterns: Vec<String>,
    pub category_patterns: Vec<String>,
    pub exclusion_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// CSS selectors for breadcrumb items, tried in order
    pub breadcrumb_selectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Shallowest prefix depth tried during fallback
    pub min_depth: usize,

    /// Leading segments stripped before prefix fallback (site-root crumbs)
    pub root_segments_to_drop: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_example_urls: usize,
}

/// Crawl-run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Store the run's products belong to
    pub store_id: String,

    /// Maximum pages fetched concurrently
    pub max_concurrent_pages: usize,

    /// Cap on URLs taken from each urlset (unbounded when unset)
    pub max_urls_per_sitemap: Option<usize>,

    /// Cap on nested sitemap index depth
    pub max_index_depth: usize,

    /// Directory for exported records
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://data/catalog_canon.db`
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files. Defaults to `logs/` next to the executable.
    pub log_dir: Option<PathBuf>,

    /// File rotation: "daily" or "never"
    pub rotation: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Keep only the most recent log file (delete all others)
    pub keep_only_latest: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            expected_size: defaults::TAXONOMY_SIZE,
            categories_file: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let rules = ClassificationRules::default();
        Self {
            allowed_hosts: defaults::ALLOWED_HOSTS.iter().map(|s| (*s).to_string()).collect(),
            product_patterns: rules.product_patterns,
            category_patterns: rules.category_patterns,
            exclusion_patterns: rules.exclusion_patterns,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            breadcrumb_selectors: crate::infrastructure::parsing::html_breadcrumb::DEFAULT_BREADCRUMB_SELECTORS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            min_depth: defaults::MIN_DEPTH,
            root_segments_to_drop: defaults::ROOT_SEGMENTS_TO_DROP,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_example_urls: defaults::MAX_EXAMPLE_URLS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_id: defaults::STORE_ID.to_string(),
            max_concurrent_pages: defaults::MAX_CONCURRENT_PAGES,
            max_urls_per_sitemap: None,
            max_index_depth: defaults::MAX_INDEX_DEPTH,
            export_dir: PathBuf::from(defaults::EXPORT_DIR),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            rotation: defaults::LOG_ROTATION.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            keep_only_latest: defaults::LOG_KEEP_ONLY_LATEST,
            module_filters,
        }
    }
}

impl ClassifierConfig {
    pub fn to_rules(&self) -> ClassificationRules {
        ClassificationRules {
            product_patterns: self.product_patterns.clone(),
            category_patterns: self.category_patterns.clone(),
            exclusion_patterns: self.exclusion_patterns.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
        }
    }
}

impl ResolverSettings {
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            min_depth: self.min_depth,
            root_segments_to_drop: self.root_segments_to_drop,
        }
    }
}

impl CanonConfig {
    /// Loads from a file plus environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from the environment only, on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = config::Config::builder().add_source(environment()).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.taxonomy.expected_size == 0 {
            return Err(ConfigError::validation("taxonomy.expected_size must be greater than 0"));
        }
        if self.taxonomy.expected_size > usize::from(u16::MAX) {
            return Err(ConfigError::validation("taxonomy.expected_size does not fit a canon_id"));
        }
        if self.resolver.min_depth == 0 {
            return Err(ConfigError::validation("resolver.min_depth must be at least 1"));
        }
        if self.ledger.max_example_urls == 0 {
            return Err(ConfigError::validation("ledger.max_example_urls must be at least 1"));
        }
        if self.pipeline.max_concurrent_pages == 0 {
            return Err(ConfigError::validation("pipeline.max_concurrent_pages must be at least 1"));
        }
        if self.pipeline.store_id.trim().is_empty() {
            return Err(ConfigError::validation("pipeline.store_id must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::validation("database.max_connections must be at least 1"));
        }

        for (group, patterns) in [
            ("product_patterns", &self.classifier.product_patterns),
            ("category_patterns", &self.classifier.category_patterns),
            ("exclusion_patterns", &self.classifier.exclusion_patterns),
        ] {
            for pattern in patterns {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::validation(format!(
                        "classifier.{} contains an invalid pattern '{}': {}",
                        group, pattern, e
                    )));
                }
            }
        }

        if !matches!(self.logging.rotation.as_str(), "daily" | "never") {
            return Err(ConfigError::validation(format!(
                "logging.rotation must be 'daily' or 'never', got '{}'",
                self.logging.rotation
            )));
        }

        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Configuration manager for locating, loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("catalog-canon");

        Ok(config_dir)
    }

    /// Manager for the default location
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self {
            config_path: config_dir.join("catalog_canon.toml"),
        })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the file if present, otherwise defaults plus environment.
    pub fn load_config(&self) -> Result<CanonConfig> {
        if self.config_path.exists() {
            let config = CanonConfig::from_file(&self.config_path)
                .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))?;
            info!("Loaded configuration from: {:?}", self.config_path);
            Ok(config)
        } else {
            info!("Configuration file not found, using defaults: {:?}", self.config_path);
            Ok(CanonConfig::from_env()?)
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &CanonConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = match self.config_path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::to_string_pretty(config).context("Failed to serialize configuration")?,
            _ => toml::to_string_pretty(config).context("Failed to serialize configuration")?,
        };

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Writes a default file unless one already exists.
    pub async fn save_default(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }
        self.save_config(&CanonConfig::default()).await?;
        Ok(true)
    }
}

/// Default configuration values
pub mod defaults {
    /// Size of the canonical taxonomy
    pub const TAXONOMY_SIZE: usize = crate::domain::constants::taxonomy::CANONICAL_CATEGORY_COUNT;

    pub const ALLOWED_HOSTS: &[&str] = &["www.walmart.ca", "walmart.ca"];

    pub const MIN_DEPTH: usize = crate::domain::constants::resolution::DEFAULT_MIN_DEPTH;

    pub const ROOT_SEGMENTS_TO_DROP: usize = 0;

    pub const MAX_EXAMPLE_URLS: usize = crate::domain::constants::review::DEFAULT_MAX_EXAMPLE_URLS;

    pub const STORE_ID: &str = "walmart-ca";

    /// Low by default; the site throttles aggressively
    pub const MAX_CONCURRENT_PAGES: usize = 2;

    pub const MAX_INDEX_DEPTH: usize = 3;

    pub const EXPORT_DIR: &str = "exports";

    pub const DATABASE_URL: &str = "sqlite://data/catalog_canon.db";

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    // Logging defaults
    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = false;

    pub const LOG_ROTATION: &str = "daily";

    pub const LOG_MAX_FILES: u32 = 5;

    pub const LOG_AUTO_CLEANUP: bool = true;

    pub const LOG_KEEP_ONLY_LATEST: bool = false;
}
