//! Page parsing infrastructure
//!
//! Breadcrumbs come from two kinds of sources: the HTML breadcrumb trail and
//! structured data embedded in the page. Both implement [`BreadcrumbExtractor`]
//! and produce the same [`RawBreadcrumb`], so nothing downstream cares which
//! one found it.

pub mod html_breadcrumb;
pub mod product_page_parser;
pub mod structured_data;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
pub use html_breadcrumb::HtmlBreadcrumbExtractor;
pub use product_page_parser::{ProductPage, ProductPageParser};
pub use structured_data::StructuredDataExtractor;

use scraper::Html;

use crate::domain::breadcrumb::RawBreadcrumb;
use crate::domain::constants::breadcrumb::HOME_CRUMBS;
use crate::domain::services::breadcrumb_normalizer::normalize_segment;

/// Breadcrumb extraction capability
pub trait BreadcrumbExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the page has no breadcrumb of this kind.
    fn extract(&self, document: &Html) -> ParsingResult<Option<RawBreadcrumb>>;
}

/// Runs extractors in order and returns the first non-empty breadcrumb.
///
/// A failing extractor is logged and skipped.
pub fn first_breadcrumb(
    extractors: &[&dyn BreadcrumbExtractor],
    document: &Html,
) -> Option<RawBreadcrumb> {
    for extractor in extractors {
        match extractor.extract(document) {
            Ok(Some(crumb)) if !crumb.is_empty() => {
                tracing::debug!(extractor = extractor.name(), segments = crumb.segments.len(), "Breadcrumb extracted");
                return Some(crumb);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(extractor = extractor.name(), error = %e, "Breadcrumb extractor failed"),
        }
    }
    None
}

/// Trims segments, drops empty ones and a leading site-root crumb.
pub(crate) fn clean_segments<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = segments
        .into_iter()
        .map(|s| s.as_ref().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();
    if out
        .first()
        .is_some_and(|first| HOME_CRUMBS.contains(&normalize_segment(first).as_str()))
    {
        out.remove(0);
    }
    out
}
