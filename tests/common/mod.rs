//! Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use catalog_canon::domain::canonical::{CanonId, CanonicalCategory, CanonicalTaxonomy};
use catalog_canon::domain::mapping::{ApprovalSource, MappingTable, Provenance};
use catalog_canon::domain::product::{Product, ResolutionState, UnmappedReason};
use catalog_canon::domain::services::breadcrumb_normalizer::normalize_raw;
use catalog_canon::domain::services::{MappingResolver, Resolution};

pub const NAMED: &[(u16, &str, Option<u16>)] = &[
    (1, "Grocery", None),
    (2, "Dairy & Eggs", Some(1)),
    (3, "Milk", Some(2)),
    (4, "Pantry", Some(1)),
    (5, "Electronics", None),
    (6, "TVs", Some(5)),
];

pub fn categories() -> Vec<CanonicalCategory> {
    let mut categories: Vec<CanonicalCategory> = NAMED
        .iter()
        .map(|(id, name, parent)| CanonicalCategory::new(*id, *name, *parent))
        .collect();
    let next = NAMED.len() as u16 + 1;
    categories.extend((next..=113).map(|id| CanonicalCategory::new(id, format!("Category {id}"), None)));
    categories
}

/// The full 113-member taxonomy
pub fn taxonomy() -> Arc<CanonicalTaxonomy> {
    Arc::new(CanonicalTaxonomy::new(categories()).expect("valid taxonomy"))
}

pub fn id(raw: u16) -> CanonId {
    CanonId::new_unchecked(raw)
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

pub fn curator(seconds: i64) -> Provenance {
    Provenance::new("tester", ApprovalSource::LedgerResolution).at(at(seconds))
}

pub fn table_with(mappings: &[(&str, u16)]) -> Arc<MappingTable> {
    let table = Arc::new(MappingTable::new(taxonomy()));
    for (i, (path, canon)) in mappings.iter().enumerate() {
        table
            .approve(
                catalog_canon::domain::mapping::MappingApproval {
                    normalized_path: normalize_raw(path),
                    canon_id: id(*canon),
                    confidence: None,
                    provenance: curator(i as i64),
                },
                false,
            )
            .expect("approval");
    }
    table
}

/// Product resolved against `table` as of now
pub fn product(sku: &str, crumb: Option<&str>, table: &MappingTable, scraped_at: DateTime<Utc>) -> Product {
    let resolver = MappingResolver::default();
    let path = crumb.map(normalize_raw).filter(|p| !p.is_empty());
    let resolution_state = match &path {
        None => ResolutionState::Unmapped(UnmappedReason::NoBreadcrumb),
        Some(p) => match resolver.resolve(p, &table.snapshot()) {
            Resolution::Resolved { canon_id, .. } => ResolutionState::Resolved(canon_id),
            Resolution::Unmapped => ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix),
        },
    };
    Product {
        store_id: "walmart-ca".into(),
        store_product_id: sku.into(),
        name: Some(format!("Item {sku}")),
        price: Some(4.0),
        source_url: format!("https://www.walmart.ca/en/ip/item-{sku}/{sku}"),
        breadcrumb_path_norm: path,
        resolution_state,
        scraped_at,
    }
}

/// Product page carrying a JSON-LD breadcrumb
pub fn product_page_html(name: &str, crumbs: &[&str]) -> String {
    let items: Vec<String> = crumbs
        .iter()
        .enumerate()
        .map(|(i, c)| format!(r#"{{"@type":"ListItem","position":{},"name":"{}"}}"#, i + 1, c))
        .collect();
    format!(
        r#"<html><head>
<script type="application/ld+json">{{"@context":"https://schema.org","@type":"BreadcrumbList","itemListElement":[{}]}}</script>
</head><body><h1>{}</h1><span itemprop="price">$4.97</span></body></html>"#,
        items.join(","),
        name
    )
}
