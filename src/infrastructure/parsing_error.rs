//! Parsing error types for breadcrumb, structured-data and sitemap extraction
//!
//! A parsing failure affects one page or one sitemap only. Callers decide from
//! [`ParsingError::is_recoverable`] whether a later re-crawl may succeed.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Required field '{field}' not found")]
    RequiredFieldMissing {
        field: String,
        context: Option<String>,
    },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Structured data is malformed: {reason}")]
    StructuredDataMalformed {
        reason: String,
        url: Option<String>,
    },

    #[error("Sitemap XML is malformed at byte {position}: {reason}")]
    SitemapXml { reason: String, position: u64 },

    #[error("Document is neither a urlset nor a sitemap index (root <{root}>)")]
    UnexpectedSitemapRoot { root: String },

    #[error("Invalid date '{value}'")]
    InvalidDate { value: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &str, context: Option<&str>) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            context: context.map(|s| s.to_string()),
        }
    }

    pub fn invalid_selector(selector: &str, reason: &str) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn structured_data(reason: impl Into<String>, url: Option<&str>) -> Self {
        Self::StructuredDataMalformed {
            reason: reason.into(),
            url: url.map(str::to_string),
        }
    }

    /// Check if a later re-crawl of the same page may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RequiredFieldMissing { .. } => true,
            Self::StructuredDataMalformed { .. } => true,
            Self::SitemapXml { .. } => true,
            Self::InvalidDate { .. } => true,
            Self::InvalidSelector { .. } => false,
            Self::UnexpectedSitemapRoot { .. } => false,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
