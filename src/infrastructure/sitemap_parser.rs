//! Sitemap XML parsing
//!
//! Turns raw sitemap bytes into a [`SitemapDocument`]. Both `<urlset>` and
//! `<sitemapindex>` roots are accepted, with or without the sitemaps.org
//! namespace. Fetching (and gzip) belongs to the caller.

#![allow(clippy::uninlined_format_args)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::domain::discovery::{SitemapDocument, SitemapEntry};
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    UrlSet,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"loc" => Some(Self::Loc),
            b"lastmod" => Some(Self::LastMod),
            b"changefreq" => Some(Self::ChangeFreq),
            b"priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

#[derive(Default)]
struct PendingEntry {
    loc: String,
    lastmod: String,
    changefreq: String,
    priority: String,
}

impl PendingEntry {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Loc => &mut self.loc,
            Field::LastMod => &mut self.lastmod,
            Field::ChangeFreq => &mut self.changefreq,
            Field::Priority => &mut self.priority,
        };
        target.push_str(text);
    }

    fn finish(self) -> Option<SitemapEntry> {
        let loc = self.loc.trim();
        if loc.is_empty() {
            return None;
        }
        let lastmod = non_empty(&self.lastmod).and_then(|raw| {
            let parsed = parse_lastmod(raw);
            if parsed.is_none() {
                debug!(loc, lastmod = raw, "Ignoring unparseable lastmod");
            }
            parsed
        });
        Some(SitemapEntry {
            loc: loc.to_string(),
            lastmod,
            changefreq: non_empty(&self.changefreq).map(str::to_lowercase),
            priority: non_empty(&self.priority).and_then(|p| p.parse::<f32>().ok()),
        })
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}

/// Parses one sitemap document.
pub fn parse_sitemap(bytes: &[u8]) -> ParsingResult<SitemapDocument> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut root: Option<RootKind> = None;
    let mut entries = Vec::new();
    let mut current: Option<PendingEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ParsingError::SitemapXml {
            reason: e.to_string(),
            position: reader.buffer_position() as u64,
        })?;

        match event {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                match root {
                    None => root = Some(root_kind(name)?),
                    Some(kind) => {
                        if current.is_none() && name == entry_tag(kind) {
                            current = Some(PendingEntry::default());
                        } else if current.is_some() {
                            field = Field::from_local_name(name);
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if root.is_none() {
                    root = Some(root_kind(e.local_name().as_ref())?);
                }
            }
            Event::Text(t) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(|e| ParsingError::SitemapXml {
                        reason: e.to_string(),
                        position: reader.buffer_position() as u64,
                    })?;
                    entry.push(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    entry.push(f, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if let Some(kind) = root {
                    if name == entry_tag(kind) {
                        if let Some(entry) = current.take().and_then(PendingEntry::finish) {
                            entries.push(entry);
                        }
                        field = None;
                    } else if Field::from_local_name(name).is_some() {
                        field = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match root {
        Some(RootKind::UrlSet) => Ok(SitemapDocument::UrlSet(entries)),
        Some(RootKind::Index) => Ok(SitemapDocument::Index(entries)),
        None => Err(ParsingError::SitemapXml {
            reason: "document has no root element".to_string(),
            position: reader.buffer_position() as u64,
        }),
    }
}

fn root_kind(name: &[u8]) -> ParsingResult<RootKind> {
    match name {
        b"urlset" => Ok(RootKind::UrlSet),
        b"sitemapindex" => Ok(RootKind::Index),
        other => Err(ParsingError::UnexpectedSitemapRoot {
            root: String::from_utf8_lossy(other).into_owned(),
        }),
    }
}

fn entry_tag(kind: RootKind) -> &'static [u8] {
    match kind {
        RootKind::UrlSet => b"url",
        RootKind::Index => b"sitemap",
    }
}

/// W3C datetime as used by sitemaps: full RFC 3339, minute precision, naive
/// datetimes (read as UTC) and plain dates.
pub fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Incremental-crawl filter applied to urlset entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SitemapFilter {
    /// Entries whose `lastmod` is older are dropped; entries without one are kept.
    pub since: Option<DateTime<Utc>>,
    pub max_urls: Option<usize>,
}

impl SitemapFilter {
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn max_urls(mut self, max_urls: usize) -> Self {
        self.max_urls = Some(max_urls);
        self
    }

    pub fn accepts(&self, entry: &SitemapEntry) -> bool {
        match (self.since, entry.lastmod) {
            (Some(since), Some(lastmod)) => lastmod >= since,
            _ => true,
        }
    }

    pub fn apply(&self, entries: Vec<SitemapEntry>) -> Vec<SitemapEntry> {
        let limit = self.max_urls.unwrap_or(usize::MAX);
        entries
            .into_iter()
            .filter(|e| self.accepts(e))
            .take(limit)
            .collect()
    }
}

/// `Sitemap:` directives of a robots.txt, in order.
pub fn extract_sitemaps_from_robots(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (key, value) = line.split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("sitemap") {
                return None;
            }
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://www.walmart.ca/en/ip/great-value-milk/6000191273456</loc>
    <lastmod>2024-03-05T10:15:00+00:00</lastmod>
    <changefreq>Daily</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc><![CDATA[https://www.walmart.ca/en/browse/grocery/10019]]></loc>
    <lastmod>2024-01-02</lastmod>
  </url>
  <url><loc>   </loc></url>
</urlset>"#;

    #[test]
    fn test_parse_urlset() {
        let SitemapDocument::UrlSet(entries) = parse_sitemap(URLSET.as_bytes()).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loc, "https://www.walmart.ca/en/ip/great-value-milk/6000191273456");
        assert_eq!(entries[0].lastmod, Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 15, 0).unwrap()));
        assert_eq!(entries[0].changefreq.as_deref(), Some("daily"));
        assert_eq!(entries[0].priority, Some(0.8));
        assert_eq!(entries[1].loc, "https://www.walmart.ca/en/browse/grocery/10019");
        assert_eq!(entries[1].lastmod, Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_index_without_namespace() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://www.walmart.ca/sitemap-categories.xml</loc></sitemap>
            <sitemap><loc>https://www.walmart.ca/sitemap-products-1.xml</loc><lastmod>2024-02-01</lastmod></sitemap>
        </sitemapindex>"#;
        let SitemapDocument::Index(entries) = parse_sitemap(xml.as_bytes()).unwrap() else {
            panic!("expected index");
        };
        let locs: Vec<_> = entries.iter().map(|e| e.loc.as_str()).collect();
        assert_eq!(
            locs,
            vec!["https://www.walmart.ca/sitemap-categories.xml", "https://www.walmart.ca/sitemap-products-1.xml"]
        );
    }

    #[test]
    fn test_escaped_loc() {
        let xml = "<urlset><url><loc>https://a.ca/x?a=1&amp;b=2</loc></url></urlset>";
        let SitemapDocument::UrlSet(entries) = parse_sitemap(xml.as_bytes()).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries[0].loc, "https://a.ca/x?a=1&b=2");
    }

    #[test]
    fn test_unexpected_root() {
        let result = parse_sitemap(b"<html><body/></html>");
        assert_eq!(result, Err(ParsingError::UnexpectedSitemapRoot { root: "html".into() }));
    }

    #[test]
    fn test_malformed_xml() {
        let result = parse_sitemap(b"<urlset><url><loc>x</lo></url></urlset>");
        assert!(matches!(result, Err(ParsingError::SitemapXml { .. })));
        assert!(parse_sitemap(b"").is_err());
    }

    #[test]
    fn test_lastmod_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 10, 15, 0).unwrap();
        assert_eq!(parse_lastmod("2024-03-05T10:15:00Z"), Some(expected));
        assert_eq!(parse_lastmod("2024-03-05T05:15:00-05:00"), Some(expected));
        assert_eq!(parse_lastmod("2024-03-05T10:15+00:00"), Some(expected));
        assert_eq!(parse_lastmod("2024-03-05T10:15:00"), Some(expected));
        assert_eq!(parse_lastmod("yesterday"), None);
    }

    #[test]
    fn test_filter_since_and_limit() {
        let old = SitemapEntry {
            lastmod: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..SitemapEntry::new("https://a.ca/old")
        };
        let fresh = SitemapEntry {
            lastmod: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            ..SitemapEntry::new("https://a.ca/fresh")
        };
        let undated = SitemapEntry::new("https://a.ca/undated");
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let kept = SitemapFilter::default()
            .since(since)
            .apply(vec![old.clone(), fresh.clone(), undated.clone()]);
        assert_eq!(kept, vec![fresh.clone(), undated.clone()]);

        let limited = SitemapFilter::default().max_urls(1).apply(vec![old.clone(), fresh]);
        assert_eq!(limited, vec![old]);
    }

    #[test]
    fn test_robots_sitemaps() {
        let robots = "User-agent: *\nDisallow: /search\nSitemap: https://www.walmart.ca/sitemap.xml\nsitemap:https://www.walmart.ca/fr/sitemap.xml\n# Sitemap: commented\n";
        assert_eq!(
            extract_sitemaps_from_robots(robots),
            vec!["https://www.walmart.ca/sitemap.xml", "https://www.walmart.ca/fr/sitemap.xml"]
        );
    }
}
