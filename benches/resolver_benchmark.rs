//! Resolution throughput over a realistic mapping table
//!
//! - normalize: raw breadcrumb string to normalized path
//! - resolve: deepest-prefix lookup against one snapshot
//! - re_resolve: a full product batch on the rayon pool
//! - coverage: one coverage snapshot over the same batch

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;

use catalog_canon::application::pipeline::re_resolve_with;
use catalog_canon::domain::canonical::{CanonId, CanonicalCategory, CanonicalTaxonomy};
use catalog_canon::domain::mapping::{ApprovalSource, MappingApproval, MappingTable, Provenance};
use catalog_canon::domain::product::{Product, ResolutionState, UnmappedReason};
use catalog_canon::domain::services::breadcrumb_normalizer::normalize_raw;
use catalog_canon::domain::services::{CoverageMonitor, MappingResolver};

const DEPARTMENTS: &[&str] = &["Grocery", "Electronics", "Home", "Baby", "Toys", "Pets", "Sports"];
const AISLES: &[&str] = &["Dairy & Eggs", "Snacks", "Frozen", "TVs", "Bedding", "Diapers", "Outdoor"];
const SHELVES: &[&str] = &["Milk", "Chips", "Pizza", "4K", "Pillows", "Size 3", "Tents"];

fn taxonomy() -> Arc<CanonicalTaxonomy> {
    let categories = (1..=113)
        .map(|id| CanonicalCategory::new(id, format!("Category {id}"), None))
        .collect();
    Arc::new(CanonicalTaxonomy::new(categories).expect("valid taxonomy"))
}

fn breadcrumb(i: usize) -> String {
    format!(
        "Home > {} > {} > {}",
        DEPARTMENTS[i % DEPARTMENTS.len()],
        AISLES[(i / 7) % AISLES.len()],
        SHELVES[(i / 49) % SHELVES.len()]
    )
}

fn mapping_table() -> Arc<MappingTable> {
    let table = Arc::new(MappingTable::new(taxonomy()));
    let mut next_id = 1u16;
    // Departments map whole, every other aisle maps deeper
    for (d, department) in DEPARTMENTS.iter().enumerate() {
        let mut paths = vec![(*department).to_string()];
        paths.extend(
            AISLES
                .iter()
                .skip(d % 2)
                .step_by(2)
                .map(|aisle| format!("{department} > {aisle}")),
        );
        for path in paths {
            table
                .approve(
                    MappingApproval {
                        normalized_path: normalize_raw(&path),
                        canon_id: CanonId::new_unchecked(next_id),
                        confidence: None,
                        provenance: Provenance::new("bench", ApprovalSource::Import),
                    },
                    false,
                )
                .expect("approval");
            next_id = next_id % 113 + 1;
        }
    }
    table
}

fn products(count: usize) -> Vec<Product> {
    let now = Utc::now();
    (0..count)
        .map(|i| Product {
            store_id: "walmart-ca".into(),
            store_product_id: i.to_string(),
            name: None,
            price: None,
            source_url: format!("https://www.walmart.ca/en/ip/item/{i}"),
            breadcrumb_path_norm: Some(normalize_raw(&breadcrumb(i))),
            resolution_state: ResolutionState::Unmapped(UnmappedReason::NoMatchingPrefix),
            scraped_at: now,
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let raw = breadcrumb(123);
    c.bench_function("normalize_raw", |b| b.iter(|| normalize_raw(black_box(&raw))));
}

fn bench_resolve(c: &mut Criterion) {
    let table = mapping_table();
    let snapshot = table.snapshot();
    let resolver = MappingResolver::default();
    let path = normalize_raw(&breadcrumb(321));

    c.bench_function("resolve_single_path", |b| {
        b.iter(|| resolver.resolve(black_box(&path), &snapshot))
    });
}

fn bench_batches(c: &mut Criterion) {
    let table = mapping_table();
    let snapshot = table.snapshot();
    let resolver = MappingResolver::default();
    let monitor = CoverageMonitor::new(resolver);

    let mut group = c.benchmark_group("batch");
    for size in [1_000usize, 10_000] {
        let batch = products(size);
        group.bench_with_input(BenchmarkId::new("re_resolve", size), &batch, |b, batch| {
            b.iter(|| re_resolve_with(&resolver, &snapshot, black_box(batch)))
        });

        let resolved = re_resolve_with(&resolver, &snapshot, &batch);
        group.bench_with_input(BenchmarkId::new("coverage", size), &resolved, |b, resolved| {
            b.iter(|| monitor.compute_coverage("bench", black_box(resolved), table.taxonomy(), snapshot.version()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_resolve, bench_batches);
criterion_main!(benches);
