//! Page fetching port
//!
//! Fetching, retries and politeness belong to the collaborator behind
//! [`PageFetcher`]. The core only sees the outcome per URL and recognises block
//! pages so a run can stop instead of pressing on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Challenge interstitial markers, matched lowercase.
const CHALLENGE_SIGNALS: &[&str] = &[
    "press & hold",
    "press and hold",
    "px-captcha",
    "perimeterx",
    "verify you are human",
    "are you a robot",
];

/// Throttle markers that ordinary page text can also contain.
const SOFT_SIGNALS: &[&str] = &["access denied", "too many requests", "request blocked"];

/// Catalog pages larger than this ignore [`SOFT_SIGNALS`].
const SHORT_BODY_BYTES: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    #[error("Sitemap fetch failed for {url}: {reason}")]
    SitemapFetchFailure { url: String, reason: String },

    #[error("Page fetch failed for {url}: {reason}")]
    PageFetchFailure {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Block signal '{signal}' at {url}; run stopped")]
    PolitenessViolationRisk { url: String, signal: String },

    #[error("Fetch cancelled for {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// Only a politeness signal ends the run; everything else excludes one URL.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::PolitenessViolationRisk { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::SitemapFetchFailure { url, .. }
            | Self::PageFetchFailure { url, .. }
            | Self::PolitenessViolationRisk { url, .. }
            | Self::Cancelled { url } => url,
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Returns the first block marker found in `body`.
///
/// A 403 or 429 status counts as a signal by itself.
pub fn detect_block_signal(status: u16, body: &str) -> Option<String> {
    if status == 403 || status == 429 {
        return Some(format!("http {status}"));
    }
    let lowered = body.to_lowercase();
    if let Some(signal) = CHALLENGE_SIGNALS.iter().find(|s| lowered.contains(*s)) {
        return Some((*signal).to_string());
    }

    let signal = SOFT_SIGNALS.iter().find(|s| lowered.contains(*s))?;
    let looks_like_catalog = lowered.contains("__next_data__") || lowered.contains("breadcrumb");
    if looks_like_catalog && body.len() > SHORT_BODY_BYTES {
        return None;
    }
    Some((*signal).to_string())
}

/// Turns a fetched page into an error when it is a block page.
pub fn check_page(page: FetchedPage) -> Result<FetchedPage, FetchError> {
    match detect_block_signal(page.status, &page.body) {
        Some(signal) => Err(FetchError::PolitenessViolationRisk {
            url: page.url,
            signal,
        }),
        None if page.status >= 400 => Err(FetchError::PageFetchFailure {
            url: page.url,
            status: Some(page.status),
            reason: "non-success status".to_string(),
        }),
        None => Ok(page),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_pages_are_detected() {
        assert!(detect_block_signal(200, "<html>Press & Hold to confirm</html>").is_some());
        assert!(detect_block_signal(200, "<div id=\"px-captcha\"></div>").is_some());
        assert_eq!(detect_block_signal(429, "").as_deref(), Some("http 429"));
    }

    #[test]
    fn test_normal_page_passes() {
        assert!(detect_block_signal(200, "<html><nav aria-label=\"breadcrumb\"></nav></html>").is_none());
    }

    #[test]
    fn test_large_catalog_page_mentioning_denied_passes() {
        let body = format!(
            "<script id=\"__NEXT_DATA__\">{{}}</script>{}<p>access denied to the warehouse, said a reviewer</p>",
            "x".repeat(4096)
        );
        assert!(detect_block_signal(200, &body).is_none());
    }

    #[test]
    fn test_check_page_errors() {
        let blocked = FetchedPage {
            url: "u".into(),
            status: 200,
            body: "perimeterx".into(),
        };
        assert!(check_page(blocked).unwrap_err().is_run_fatal());

        let missing = FetchedPage {
            url: "u".into(),
            status: 404,
            body: String::new(),
        };
        let err = check_page(missing).unwrap_err();
        assert!(!err.is_run_fatal());
        assert_eq!(err.url(), "u");
    }
}
