//! Offline page source
//!
//! Serves previously captured pages from a directory. `manifest.json` lists
//! `{ "url", "file", "status" }` entries; `file` is relative to the directory.
//! URLs missing from the manifest fail like an HTTP 404.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::services::{FetchError, FetchedPage, PageFetcher};

pub const MANIFEST_FILE: &str = "manifest.json";

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub url: String,
    pub file: PathBuf,
    #[serde(default = "default_status")]
    pub status: u16,
}

pub struct SnapshotFetcher {
    root: PathBuf,
    entries: HashMap<String, SnapshotEntry>,
}

impl SnapshotFetcher {
    /// Loads `manifest.json` from `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .with_context(|| format!("Failed to read page manifest {:?}", manifest_path))?;
        let entries: Vec<SnapshotEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid page manifest {:?}", manifest_path))?;

        info!(root = ?root, pages = entries.len(), "Page snapshot opened");
        Ok(Self::from_entries(root, entries))
    }

    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<SnapshotEntry>) -> Self {
        Self {
            root: root.into(),
            entries: entries.into_iter().map(|e| (e.url.trim().to_string(), e)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PageFetcher for SnapshotFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let Some(entry) = self.entries.get(url.trim()) else {
            return Err(FetchError::PageFetchFailure {
                url: url.to_string(),
                status: Some(404),
                reason: "not in snapshot".into(),
            });
        };

        let path = self.root.join(&entry.file);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::PageFetchFailure {
                url: url.to_string(),
                status: None,
                reason: format!("{}: {}", path.display(), e),
            })?;
        debug!(url, status = entry.status, bytes = body.len(), "Served page from snapshot");

        if !(200..300).contains(&entry.status) && entry.status != 403 && entry.status != 429 {
            return Err(FetchError::PageFetchFailure {
                url: url.to_string(),
                status: Some(entry.status),
                reason: format!("HTTP {}", entry.status),
            });
        }

        Ok(FetchedPage {
            url: url.to_string(),
            status: entry.status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_serves_pages_from_manifest() -> Result<()> {
        let dir = tempdir()?;
        tokio::fs::write(dir.path().join("milk.html"), "<h1>Milk</h1>").await?;
        tokio::fs::write(dir.path().join("gone.html"), "").await?;
        let manifest = serde_json::json!([
            { "url": "https://www.walmart.ca/en/ip/milk/123", "file": "milk.html" },
            { "url": "https://www.walmart.ca/en/ip/gone/456", "file": "gone.html", "status": 500 },
            { "url": "https://www.walmart.ca/en/ip/lost/789", "file": "missing.html" }
        ]);
        tokio::fs::write(dir.path().join(MANIFEST_FILE), manifest.to_string()).await?;

        let fetcher = SnapshotFetcher::open(dir.path()).await?;
        assert_eq!(fetcher.len(), 3);

        let page = fetcher.fetch("https://www.walmart.ca/en/ip/milk/123").await?;
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<h1>Milk</h1>");

        let err = fetcher.fetch("https://www.walmart.ca/en/ip/gone/456").await.unwrap_err();
        assert!(matches!(err, FetchError::PageFetchFailure { status: Some(500), .. }));

        let err = fetcher.fetch("https://www.walmart.ca/en/ip/lost/789").await.unwrap_err();
        assert!(matches!(err, FetchError::PageFetchFailure { status: None, .. }));

        let err = fetcher.fetch("https://www.walmart.ca/en/ip/other/1").await.unwrap_err();
        assert!(matches!(err, FetchError::PageFetchFailure { status: Some(404), .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_block_status_is_passed_through() -> Result<()> {
        let dir = tempdir()?;
        tokio::fs::write(dir.path().join("blocked.html"), "Robot or human?").await?;
        let fetcher = SnapshotFetcher::from_entries(
            dir.path(),
            vec![SnapshotEntry {
                url: "https://www.walmart.ca/en/ip/a/1".into(),
                file: "blocked.html".into(),
                status: 429,
            }],
        );
        let page = fetcher.fetch("https://www.walmart.ca/en/ip/a/1").await?;
        assert_eq!(page.status, 429);
        Ok(())
    }
}
