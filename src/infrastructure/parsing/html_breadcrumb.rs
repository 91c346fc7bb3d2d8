//! HTML breadcrumb trail extraction

use scraper::{Html, Selector};
use tracing::warn;

use super::{BreadcrumbExtractor, ParsingError, ParsingResult, clean_segments};
use crate::domain::breadcrumb::{BreadcrumbSourceKind, RawBreadcrumb};

/// Item selectors tried in order; the first that yields text wins.
pub const DEFAULT_BREADCRUMB_SELECTORS: &[&str] = &[
    r#"nav[aria-label="breadcrumb"] li"#,
    r#"nav[aria-label="Breadcrumb"] li"#,
    r#"[data-automation-id="breadcrumb"] a"#,
    r#"[itemtype*="BreadcrumbList"] [itemprop="name"]"#,
    "ol.breadcrumb li",
    ".breadcrumbs a",
];

pub struct HtmlBreadcrumbExtractor {
    selectors: Vec<Selector>,
    page_kind: BreadcrumbSourceKind,
}

impl HtmlBreadcrumbExtractor {
    /// `page_kind` is the kind of page being parsed (category or product).
    pub fn new(page_kind: BreadcrumbSourceKind) -> ParsingResult<Self> {
        let selectors: Vec<String> = DEFAULT_BREADCRUMB_SELECTORS.iter().map(|s| (*s).to_string()).collect();
        Self::with_selectors(&selectors, page_kind)
    }

    /// Selectors that fail to compile are skipped; all of them failing is an error.
    pub fn with_selectors(selectors: &[String], page_kind: BreadcrumbSourceKind) -> ParsingResult<Self> {
        let mut compiled = Vec::new();
        let mut last_error = None;
        for raw in selectors {
            match Selector::parse(raw) {
                Ok(selector) => compiled.push(selector),
                Err(e) => {
                    warn!("Failed to compile selector '{}': {}", raw, e);
                    last_error = Some(ParsingError::invalid_selector(raw, &e.to_string()));
                }
            }
        }
        if compiled.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(Self {
            selectors: compiled,
            page_kind,
        })
    }
}

impl BreadcrumbExtractor for HtmlBreadcrumbExtractor {
    fn name(&self) -> &'static str {
        "html_breadcrumb"
    }

    fn extract(&self, document: &Html) -> ParsingResult<Option<RawBreadcrumb>> {
        for selector in &self.selectors {
            let texts = document
                .select(selector)
                .map(|el| el.text().collect::<Vec<_>>().join(" "));
            let segments = clean_segments(texts);
            if !segments.is_empty() {
                return Ok(Some(RawBreadcrumb::new(segments, self.page_kind)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nav_breadcrumb() {
        let html = Html::parse_document(
            r#"<html><body>
            <nav aria-label="breadcrumb"><ol>
              <li><a href="/">Home</a></li>
              <li><a href="/browse/grocery">Grocery</a></li>
              <li><a href="/browse/grocery/dairy">Dairy &amp; Eggs</a></li>
              <li>Milk</li>
            </ol></nav></body></html>"#,
        );
        let extractor = HtmlBreadcrumbExtractor::new(BreadcrumbSourceKind::ProductPage).unwrap();
        let crumb = extractor.extract(&html).unwrap().unwrap();
        assert_eq!(crumb.segments, vec!["Grocery", "Dairy & Eggs", "Milk"]);
        assert_eq!(crumb.source_kind, BreadcrumbSourceKind::ProductPage);
    }

    #[test]
    fn test_microdata_fallback() {
        let html = Html::parse_document(
            r#"<ol itemscope itemtype="https://schema.org/BreadcrumbList">
              <li itemprop="itemListElement"><span itemprop="name">Toys</span></li>
              <li itemprop="itemListElement"><span itemprop="name">Puzzles</span></li>
            </ol>"#,
        );
        let extractor = HtmlBreadcrumbExtractor::new(BreadcrumbSourceKind::CategoryPage).unwrap();
        let crumb = extractor.extract(&html).unwrap().unwrap();
        assert_eq!(crumb.segments, vec!["Toys", "Puzzles"]);
    }

    #[test]
    fn test_no_breadcrumb() {
        let html = Html::parse_document("<html><body><h1>Nothing here</h1></body></html>");
        let extractor = HtmlBreadcrumbExtractor::new(BreadcrumbSourceKind::ProductPage).unwrap();
        assert!(extractor.extract(&html).unwrap().is_none());
    }

    #[test]
    fn test_all_selectors_invalid() {
        let result = HtmlBreadcrumbExtractor::with_selectors(&["nav[".to_string()], BreadcrumbSourceKind::ProductPage);
        assert!(matches!(result, Err(ParsingError::InvalidSelector { .. })));
    }
}
