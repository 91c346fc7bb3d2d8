//! Sitemap discovery types
//!
//! URLs enter the system only through published sitemaps. Each discovered URL
//! carries the sitemap it came from so its classification can be audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a sitemap declares it contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapContentHint {
    Category,
    Product,
    Mixed,
}

/// Provenance of a discovered URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SitemapContext {
    pub sitemap_url: String,
    /// Sitemap index the sitemap was listed in, if any.
    pub parent_index: Option<String>,
    pub content_hint: Option<SitemapContentHint>,
}

impl SitemapContext {
    pub fn new(sitemap_url: impl Into<String>) -> Self {
        Self {
            sitemap_url: sitemap_url.into(),
            parent_index: None,
            content_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: SitemapContentHint) -> Self {
        self.content_hint = Some(hint);
        self
    }

    pub fn with_parent(mut self, index_url: impl Into<String>) -> Self {
        self.parent_index = Some(index_url.into());
        self
    }

    /// Declared hint, or one inferred from the sitemap file name.
    pub fn effective_hint(&self) -> SitemapContentHint {
        if let Some(hint) = self.content_hint {
            return hint;
        }
        let name = self
            .sitemap_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.sitemap_url)
            .to_lowercase();
        // Whole tokens only: "sitemap" must not read as "item"
        let tokens: Vec<&str> = name.split(|c: char| !c.is_ascii_alphanumeric()).collect();
        let has = |prefixes: &[&str]| tokens.iter().any(|t| prefixes.iter().any(|p| t.starts_with(p)));
        if has(&["categor", "browse", "department", "dept"]) {
            SitemapContentHint::Category
        } else if has(&["product", "produit", "item"]) {
            SitemapContentHint::Product
        } else {
            SitemapContentHint::Mixed
        }
    }
}

/// `<url>` or `<sitemap>` element of a sitemap document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

impl SitemapEntry {
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            lastmod: None,
            changefreq: None,
            priority: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum SitemapDocument {
    /// `<sitemapindex>`: entries point at further sitemaps.
    Index(Vec<SitemapEntry>),
    /// `<urlset>`: entries are page URLs.
    UrlSet(Vec<SitemapEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlClass {
    Category,
    Product,
    Noncatalog,
}

/// Rule that produced a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClassificationReason {
    InvalidUrl { detail: String },
    ForeignHost { host: String },
    Excluded { pattern: String },
    CategorySitemap,
    ProductPattern,
    CategoryPattern,
    /// Both category and product signals matched.
    AmbiguousPatterns,
    /// Category pattern on a URL listed by a product sitemap.
    SitemapConflict,
    /// Sitemaps disagree about the same URL.
    AmbiguousAcrossSitemaps,
    NoRuleMatched,
}

impl ClassificationReason {
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::AmbiguousPatterns | Self::SitemapConflict | Self::AmbiguousAcrossSitemaps
        )
    }
}

/// Output of the URL classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub url: String,
    pub class: UrlClass,
    pub reason: ClassificationReason,
    pub sitemap: SitemapContext,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_inferred_from_name() {
        let ctx = SitemapContext::new("https://www.walmart.ca/sitemap-categories-1.xml");
        assert_eq!(ctx.effective_hint(), SitemapContentHint::Category);
        let ctx = SitemapContext::new("https://www.walmart.ca/sitemap-products-en-3.xml");
        assert_eq!(ctx.effective_hint(), SitemapContentHint::Product);
        let ctx = SitemapContext::new("https://www.walmart.ca/sitemap.xml");
        assert_eq!(ctx.effective_hint(), SitemapContentHint::Mixed);
        let ctx = SitemapContext::new("https://www.walmart.ca/sitemap_items_12.xml.gz");
        assert_eq!(ctx.effective_hint(), SitemapContentHint::Product);
    }

    #[test]
    fn test_hint_ignores_words_inside_other_words() {
        for url in [
            "https://www.walmart.ca/sitemap.xml",
            "https://www.walmart.ca/sitemap-index.xml",
            "https://www.walmart.ca/sitemaps/en/sitemap-store-locator.xml",
        ] {
            assert_eq!(SitemapContext::new(url).effective_hint(), SitemapContentHint::Mixed, "{url}");
        }
    }

    #[test]
    fn test_declared_hint_wins() {
        let ctx = SitemapContext::new("https://example.com/products.xml")
            .with_hint(SitemapContentHint::Category);
        assert_eq!(ctx.effective_hint(), SitemapContentHint::Category);
    }
}
