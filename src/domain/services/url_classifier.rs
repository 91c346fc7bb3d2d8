//! URL Classifier
//!
//! Sorts sitemap URLs into category, product and non-catalog buckets. Rules run
//! in a fixed order and the first that applies decides:
//!
//! 1. unparseable or non-http(s) URL: noncatalog
//! 2. host outside the allowed list: noncatalog
//! 3. path matches an exclusion pattern (search, cart, facets): noncatalog
//! 4. listed in a category sitemap: category
//! 5. product pattern only: product
//! 6. category pattern only, listed in a product sitemap: noncatalog (conflict)
//! 7. category pattern only: category
//! 8. both patterns: noncatalog (ambiguous)
//! 9. nothing matched: noncatalog
//!
//! Ambiguity never guesses into category or product.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::{Position, Url};

use crate::domain::discovery::{
    ClassificationReason, ClassificationRecord, SitemapContentHint, SitemapContext, UrlClass,
};

/// Pattern sources for the classifier, as regular expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    pub product_patterns: Vec<String>,
    pub category_patterns: Vec<String>,
    pub exclusion_patterns: Vec<String>,
    /// Empty means any host.
    pub allowed_hosts: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            product_patterns: vec![r"/(ip|produit)/[^/]+".to_string()],
            category_patterns: vec![r"/(browse|cp)/".to_string()],
            exclusion_patterns: vec![
                r"/search\b".to_string(),
                r"/recherche\b".to_string(),
                r"/cart\b".to_string(),
                r"/panier\b".to_string(),
                r"/sign-in\b".to_string(),
                r"/account\b".to_string(),
                r"/kiosk/".to_string(),
                r"\+".to_string(),
                r"\?f=".to_string(),
            ],
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlClassifier {
    product: Vec<Regex>,
    category: Vec<Regex>,
    exclusion: Vec<(String, Regex)>,
    allowed_hosts: Vec<String>,
}

impl UrlClassifier {
    pub fn new(rules: &ClassificationRules) -> Result<Self, regex::Error> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, regex::Error> {
            patterns.iter().map(|p| Regex::new(p)).collect()
        };
        Ok(Self {
            product: compile(&rules.product_patterns)?,
            category: compile(&rules.category_patterns)?,
            exclusion: rules
                .exclusion_patterns
                .iter()
                .map(|p| Regex::new(p).map(|re| (p.clone(), re)))
                .collect::<Result<_, _>>()?,
            allowed_hosts: rules.allowed_hosts.iter().map(|h| h.to_lowercase()).collect(),
        })
    }

    pub fn classify(&self, url: &str, sitemap: &SitemapContext) -> ClassificationRecord {
        self.classify_at(url, sitemap, Utc::now())
    }

    pub fn classify_at(
        &self,
        url: &str,
        sitemap: &SitemapContext,
        discovered_at: DateTime<Utc>,
    ) -> ClassificationRecord {
        let (class, reason) = self.decide(url.trim(), sitemap);
        if reason.is_ambiguous() {
            debug!(url, ?reason, "Ambiguous URL defaulted to noncatalog");
        }
        ClassificationRecord {
            url: url.trim().to_string(),
            class,
            reason,
            sitemap: sitemap.clone(),
            discovered_at,
        }
    }

    fn decide(&self, url: &str, sitemap: &SitemapContext) -> (UrlClass, ClassificationReason) {
        let parsed = match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(u) => {
                return (
                    UrlClass::Noncatalog,
                    ClassificationReason::InvalidUrl {
                        detail: format!("unsupported scheme {}", u.scheme()),
                    },
                );
            }
            Err(e) => {
                return (
                    UrlClass::Noncatalog,
                    ClassificationReason::InvalidUrl { detail: e.to_string() },
                );
            }
        };

        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.iter().any(|h| *h == host) {
            return (UrlClass::Noncatalog, ClassificationReason::ForeignHost { host });
        }

        let path_and_query = &parsed[Position::BeforePath..];
        if let Some((pattern, _)) = self.exclusion.iter().find(|(_, re)| re.is_match(path_and_query)) {
            return (
                UrlClass::Noncatalog,
                ClassificationReason::Excluded { pattern: pattern.clone() },
            );
        }

        let hint = sitemap.effective_hint();
        if hint == SitemapContentHint::Category {
            return (UrlClass::Category, ClassificationReason::CategorySitemap);
        }

        let path = parsed.path();
        let looks_like_product = self.product.iter().any(|re| re.is_match(path));
        let looks_like_category = self.category.iter().any(|re| re.is_match(path));

        match (looks_like_product, looks_like_category) {
            (true, false) => (UrlClass::Product, ClassificationReason::ProductPattern),
            (false, true) if hint == SitemapContentHint::Product => {
                (UrlClass::Noncatalog, ClassificationReason::SitemapConflict)
            }
            (false, true) => (UrlClass::Category, ClassificationReason::CategoryPattern),
            (true, true) => (UrlClass::Noncatalog, ClassificationReason::AmbiguousPatterns),
            (false, false) => (UrlClass::Noncatalog, ClassificationReason::NoRuleMatched),
        }
    }

    /// Classifies URLs that may be listed by several sitemaps.
    ///
    /// Returns one record per distinct URL in first-seen order. When one sitemap
    /// says category and another says product the URL becomes noncatalog.
    /// `NoRuleMatched` verdicts abstain.
    pub fn classify_batch<'a, I>(&self, discovered: I) -> Vec<ClassificationRecord>
    where
        I: IntoIterator<Item = (&'a str, &'a SitemapContext)>,
    {
        let now = Utc::now();
        let mut order: Vec<String> = Vec::new();
        let mut verdicts: HashMap<String, Vec<ClassificationRecord>> = HashMap::new();

        for (url, sitemap) in discovered {
            let record = self.classify_at(url, sitemap, now);
            let slot = verdicts.entry(record.url.clone()).or_insert_with(|| {
                order.push(record.url.clone());
                Vec::new()
            });
            slot.push(record);
        }

        order
            .into_iter()
            .filter_map(|url| verdicts.remove(&url))
            .filter_map(reconcile)
            .collect()
    }
}

fn reconcile(mut records: Vec<ClassificationRecord>) -> Option<ClassificationRecord> {
    let has = |class: UrlClass, records: &[ClassificationRecord]| records.iter().any(|r| r.class == class);

    if has(UrlClass::Category, &records) && has(UrlClass::Product, &records) {
        let mut first = records.swap_remove(0);
        warn!(url = %first.url, "Sitemaps disagree about URL class");
        first.class = UrlClass::Noncatalog;
        first.reason = ClassificationReason::AmbiguousAcrossSitemaps;
        return Some(first);
    }

    if let Some(i) = records.iter().position(|r| r.class != UrlClass::Noncatalog) {
        return Some(records.swap_remove(i));
    }
    if let Some(i) = records
        .iter()
        .position(|r| r.reason != ClassificationReason::NoRuleMatched)
    {
        return Some(records.swap_remove(i));
    }
    records.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> UrlClassifier {
        UrlClassifier::new(&ClassificationRules::default()).unwrap()
    }

    fn mixed() -> SitemapContext {
        SitemapContext::new("https://www.walmart.ca/sitemap-mixed.xml")
    }

    #[test]
    fn test_product_pattern() {
        let record = classifier().classify("https://www.walmart.ca/en/ip/great-value-milk/6000191273456", &mixed());
        assert_eq!(record.class, UrlClass::Product);
        assert_eq!(record.reason, ClassificationReason::ProductPattern);
    }

    #[test]
    fn test_category_sitemap_origin() {
        let ctx = SitemapContext::new("https://www.walmart.ca/sitemap.xml").with_hint(SitemapContentHint::Category);
        let record = classifier().classify("https://www.walmart.ca/en/grocery/N-117", &ctx);
        assert_eq!(record.class, UrlClass::Category);
        assert_eq!(record.reason, ClassificationReason::CategorySitemap);
    }

    #[test]
    fn test_exclusions_win_over_patterns() {
        let record = classifier().classify("https://www.walmart.ca/en/search?q=milk", &mixed());
        assert_eq!(record.class, UrlClass::Noncatalog);
        assert!(matches!(record.reason, ClassificationReason::Excluded { .. }));

        let record = classifier().classify("https://www.walmart.ca/browse/grocery?f=brand", &mixed());
        assert!(matches!(record.reason, ClassificationReason::Excluded { .. }));
    }

    #[test]
    fn test_invalid_urls() {
        let record = classifier().classify("not a url", &mixed());
        assert!(matches!(record.reason, ClassificationReason::InvalidUrl { .. }));
        let record = classifier().classify("ftp://www.walmart.ca/ip/a/1", &mixed());
        assert!(matches!(record.reason, ClassificationReason::InvalidUrl { .. }));
    }

    #[test]
    fn test_foreign_host() {
        let rules = ClassificationRules {
            allowed_hosts: vec!["www.walmart.ca".to_string()],
            ..ClassificationRules::default()
        };
        let classifier = UrlClassifier::new(&rules).unwrap();
        let record = classifier.classify("https://cdn.example.com/ip/a/1", &mixed());
        assert!(matches!(record.reason, ClassificationReason::ForeignHost { .. }));
    }

    #[test]
    fn test_disagreeing_sitemaps_make_url_ambiguous() {
        let url = "https://www.walmart.ca/en/ip/thing/123";
        let categories = SitemapContext::new("https://www.walmart.ca/sitemap-categories.xml");
        let mixed = mixed();

        let batch = classifier().classify_batch([(url, &mixed), (url, &categories)]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].class, UrlClass::Noncatalog);
        assert_eq!(batch[0].reason, ClassificationReason::AmbiguousAcrossSitemaps);
    }

    #[test]
    fn test_no_rule_matched_abstains() {
        let url = "https://www.walmart.ca/en/grocery/N-117";
        let categories = SitemapContext::new("https://www.walmart.ca/sitemap-categories.xml");
        let mixed = mixed();

        let batch = classifier().classify_batch([(url, &mixed), (url, &categories)]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].class, UrlClass::Category);
        assert_eq!(batch[0].sitemap, categories);
    }

    #[test]
    fn test_batch_keeps_first_seen_order() {
        let mixed = mixed();
        let a = "https://www.walmart.ca/en/ip/a/1";
        let b = "https://www.walmart.ca/en/browse/grocery/10019";
        let batch = classifier().classify_batch([(a, &mixed), (b, &mixed), (a, &mixed)]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].class, UrlClass::Product);
        assert_eq!(batch[1].class, UrlClass::Category);
    }

    #[test]
    fn test_both_patterns_are_ambiguous() {
        let record = classifier().classify("https://www.walmart.ca/browse/ip/x", &mixed());
        assert_eq!(record.class, UrlClass::Noncatalog);
        assert_eq!(record.reason, ClassificationReason::AmbiguousPatterns);
    }

    #[test]
    fn test_product_sitemap_rejects_category_pages() {
        let products = SitemapContext::new("https://www.walmart.ca/sitemap-products-2.xml");
        let url = "https://www.walmart.ca/en/browse/grocery/10019";

        let record = classifier().classify(url, &products);
        assert_eq!(record.class, UrlClass::Noncatalog);
        assert_eq!(record.reason, ClassificationReason::SitemapConflict);
        assert!(record.reason.is_ambiguous());

        assert_eq!(classifier().classify(url, &mixed()).class, UrlClass::Category);
    }

    #[test]
    fn test_plain_sitemap_name_is_mixed() {
        let plain = SitemapContext::new("https://www.walmart.ca/sitemap.xml");
        let record = classifier().classify("https://www.walmart.ca/en/browse/grocery/10019", &plain);
        assert_eq!(record.class, UrlClass::Category);
        assert_eq!(record.reason, ClassificationReason::CategoryPattern);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let rules = ClassificationRules {
            product_patterns: vec!["(".to_string()],
            ..ClassificationRules::default()
        };
        assert!(UrlClassifier::new(&rules).is_err());
    }
}
