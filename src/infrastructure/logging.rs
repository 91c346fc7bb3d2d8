//! Logging system configuration and initialization
//!
//! - Console and/or file output, file output through a non-blocking appender
//! - Daily or never-rolling log files
//! - Optional JSON formatting
//! - `RUST_LOG` overrides the configured filter
//! - UTC timestamps

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    filter::Directive,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "catalog-canon.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Log directory: the configured one, or `logs/` next to the executable
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Builds the filter used when `RUST_LOG` is not set.
///
/// Below TRACE, dependency noise (sqlx queries, hyper, tokio) is suppressed.
/// `module_filters` entries are applied last.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let mut directives: Vec<String> = Vec::new();
    if !config.level.to_lowercase().contains("trace") {
        directives.extend(
            ["sqlx::query=warn", "sqlx::sqlite=warn", "hyper=warn", "tokio=info", "runtime=warn"]
                .iter()
                .map(|s| (*s).to_string()),
        );
        directives.push(format!("catalog_canon={}", config.level));
    }
    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    directives.extend(modules.into_iter().map(|(module, level)| format!("{}={}", module, level)));

    for raw in directives {
        let directive: Directive = raw
            .parse()
            .map_err(|e| anyhow!("Invalid log directive '{}': {}", raw, e))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// ```bash
/// # Show SQL queries on DEBUG
/// RUST_LOG="debug,sqlx::query=debug" catalog-canon coverage
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory(&config);

    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, &config)?;
        }
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(&config)?,
    };

    let registry = Registry::default().with(env_filter);

    // Each subscriber stack needs its own layer type
    macro_rules! console_layer {
        () => {
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
        };
    }

    // Handle different combinations of output types
    match (config.file_output, config.console_output) {
        (true, console) => {
            let file_appender = match config.rotation.as_str() {
                "never" => rolling::never(&log_dir, LOG_FILE_PREFIX),
                _ => rolling::daily(&log_dir, LOG_FILE_PREFIX),
            };
            let (file_writer, file_guard) = non_blocking(file_appender);

            // Store the guard globally to prevent it from being dropped
            LOG_GUARDS
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);
                let console_layer = console.then(|| console_layer!());
                registry.with(file_layer).with(console_layer).try_init()?;
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_ansi(false);
                let console_layer = console.then(|| console_layer!());
                registry.with(file_layer).with(console_layer).try_init()?;
            }
        }
        (false, true) => {
            if config.json_format {
                let layer = fmt::Layer::new()
                    .json()
                    .with_writer(std::io::stdout)
                    .with_timer(UtcTimeFormatter);
                registry.with(layer).try_init()?;
            } else {
                registry.with(console_layer!()).try_init()?;
            }
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        "Logging system initialized"
    );
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }

    Ok(())
}

/// Clean up old log files based on configuration
///
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) || name.ends_with(".log"));
        if is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = if config.keep_only_latest {
        1
    } else {
        config.max_files as usize
    };

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    if removed > 0 {
        info!("Removed {} old log files (keeping {})", removed, keep);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert_eq!(config.rotation, "daily");
    }

    #[test]
    fn test_log_directory_override() {
        let config = LoggingConfig {
            log_dir: Some(PathBuf::from("/tmp/canon-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(get_log_directory(&config), PathBuf::from("/tmp/canon-logs"));
        assert!(get_log_directory(&LoggingConfig::default()).ends_with("logs"));
    }

    #[test]
    fn test_env_filter_builds() {
        let mut config = LoggingConfig::default();
        assert!(build_env_filter(&config).is_ok());
        config.level = "trace".into();
        config.module_filters.insert("catalog_canon::infrastructure".into(), "debug".into());
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in ["a.log", "b.log", "c.log", "notes.txt"].iter().enumerate() {
            let path = dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            let mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000 + i as u64);
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }
        let config = LoggingConfig {
            max_files: 2,
            ..LoggingConfig::default()
        };
        assert_eq!(cleanup_old_logs(dir.path(), &config).unwrap(), 1);
        assert!(!dir.path().join("a.log").exists());
        assert!(dir.path().join("c.log").exists());
        assert!(dir.path().join("notes.txt").exists());

        let latest_only = LoggingConfig {
            keep_only_latest: true,
            ..LoggingConfig::default()
        };
        assert_eq!(cleanup_old_logs(dir.path(), &latest_only).unwrap(), 1);
        assert!(!dir.path().join("b.log").exists());
    }
}
