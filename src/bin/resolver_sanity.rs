//! Small sanity run to verify prefix resolution, the review queue and coverage

use catalog_canon::domain::canonical::{CanonId, CanonicalCategory, CanonicalTaxonomy};
use catalog_canon::domain::mapping::{ApprovalSource, MappingTable, Provenance};
use catalog_canon::domain::product::{Product, ResolutionState, UnmappedReason};
use catalog_canon::domain::services::breadcrumb_normalizer::normalize_raw;
use catalog_canon::domain::services::{
    CoverageMonitor, MappingResolver, Resolution, ResolverConfig, UnmappedReviewLedger,
};
use std::sync::Arc;

const NAMED: &[(u16, &str, Option<u16>)] = &[
    (1, "Grocery", None),
    (2, "Dairy & Eggs", Some(1)),
    (3, "Milk", Some(2)),
    (4, "Pantry", Some(1)),
    (5, "Electronics", None),
];

fn taxonomy() -> anyhow::Result<CanonicalTaxonomy> {
    let mut categories: Vec<CanonicalCategory> = NAMED
        .iter()
        .map(|(id, name, parent)| CanonicalCategory::new(*id, *name, *parent))
        .collect();
    let next = NAMED.len() as u16 + 1;
    categories.extend((next..=113).map(|id| CanonicalCategory::new(id, format!("Category {id}"), None)));
    Ok(CanonicalTaxonomy::new(categories)?)
}

fn product(id: &str, crumb: &str, resolver: &MappingResolver, table: &MappingTable) -> Product {
    let path = normalize_raw(crumb);
    let state = match resolver.resolve(&path, &table.snapshot()) {
        Resolution::Resolved { canon_id, .. } => ResolutionState::Resolved(canon_id),
        Resolution::Unmapped => ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix),
    };
    Product {
        store_id: "walmart-ca".into(),
        store_product_id: id.into(),
        name: None,
        price: None,
        source_url: format!("https://www.walmart.ca/en/ip/item/{id}"),
        breadcrumb_path_norm: Some(path),
        resolution_state: state,
        scraped_at: chrono::Utc::now(),
    }
}

fn main() -> anyhow::Result<()> {
    let taxonomy = Arc::new(taxonomy()?);
    let table = Arc::new(MappingTable::new(Arc::clone(&taxonomy)));
    let resolver = MappingResolver::new(ResolverConfig::default());
    let ledger = UnmappedReviewLedger::new(Arc::clone(&table), resolver);
    let curator = || Provenance::new("sanity", ApprovalSource::Import);

    ledger.approve(&normalize_raw("Grocery"), CanonId::new_unchecked(1), curator(), false)?;
    ledger.approve(&normalize_raw("Grocery > Dairy & Eggs"), CanonId::new_unchecked(2), curator(), false)?;

    let crumbs = [
        "Grocery > Dairy & Eggs > Milk > 2%",
        "Grocery > Pantry > Pasta",
        "Electronics > TVs",
    ];
    println!("Mapping version {}", table.snapshot().version());
    for crumb in crumbs {
        let path = normalize_raw(crumb);
        match resolver.resolve(&path, &table.snapshot()) {
            Resolution::Resolved { canon_id, matched_key } => {
                println!("  {path:<40} -> {canon_id} via '{matched_key}'");
            }
            Resolution::Unmapped => {
                ledger.record(&path, "https://www.walmart.ca/en/ip/example/1");
                println!("  {path:<40} -> unmapped (queued)");
            }
        }
    }

    let first: Vec<Product> = crumbs
        .iter()
        .enumerate()
        .map(|(i, c)| product(&i.to_string(), c, &resolver, &table))
        .collect();
    let monitor = CoverageMonitor::new(resolver);
    let before = monitor.compute_coverage("sanity-1", &first, &taxonomy, table.snapshot().version());
    println!("Coverage before: {:.1}%  pending: {}", before.percent_labelled, ledger.pending_queue().len());

    let receipt = ledger.approve(&normalize_raw("Electronics"), CanonId::new_unchecked(5), curator(), false)?;
    println!("Approved electronics, resolved {} queued path(s)", receipt.resolved_records.len());

    let second: Vec<Product> = crumbs
        .iter()
        .enumerate()
        .map(|(i, c)| product(&i.to_string(), c, &resolver, &table))
        .collect();
    let mut after = monitor.compute_coverage("sanity-2", &second, &taxonomy, table.snapshot().version());
    after.timestamp = after.timestamp.max(before.timestamp + chrono::Duration::milliseconds(1));
    let stability = monitor.compute_stability(&before, &after, &table.snapshot());
    println!(
        "Coverage after: {:.1}%  changed: {}  explained: {}  drift flags: {}",
        after.percent_labelled,
        stability.changed_products,
        stability.explained_changes,
        stability.drift_flags.len()
    );
    Ok(())
}
