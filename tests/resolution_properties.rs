//! Property tests for canonical mapping resolution
mod common;

use proptest::prelude::*;
use std::sync::Arc;

use catalog_canon::domain::mapping::{MappingApproval, MappingTable};
use catalog_canon::domain::services::breadcrumb_normalizer::normalize;
use catalog_canon::domain::services::{MappingResolver, Resolution, ResolverConfig};

const WORDS: &[&str] = &["grocery", "dairy and eggs", "milk", "pantry", "frozen", "tvs"];

fn path_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(WORDS), 1..=max)
        .prop_map(|words| words.into_iter().map(str::to_string).collect())
}

fn build_table(mappings: &[(Vec<String>, u16)]) -> Arc<MappingTable> {
    let table = Arc::new(MappingTable::new(common::taxonomy()));
    for (i, (segments, canon)) in mappings.iter().enumerate() {
        table
            .approve(
                MappingApproval {
                    normalized_path: normalize(segments),
                    canon_id: common::id(*canon),
                    confidence: None,
                    provenance: common::curator(i as i64),
                },
                true,
            )
            .unwrap();
    }
    table
}

proptest! {
    #[test]
    fn resolution_is_deterministic_and_closed(
        path in path_strategy(5),
        mappings in prop::collection::vec((path_strategy(3), 1u16..=113), 0..8),
    ) {
        let table = build_table(&mappings);
        let snapshot = table.snapshot();
        let resolver = MappingResolver::default();
        let path = normalize(&path);

        let first = resolver.resolve(&path, &snapshot);
        let second = resolver.resolve(&path, &snapshot);
        prop_assert_eq!(&first, &second);

        if let Resolution::Resolved { canon_id, .. } = &first {
            prop_assert!(table.taxonomy().contains(*canon_id));
        }
    }

    #[test]
    fn deepest_mapped_prefix_wins(
        path in path_strategy(5),
        mappings in prop::collection::vec((path_strategy(4), 1u16..=113), 0..8),
    ) {
        let table = build_table(&mappings);
        let snapshot = table.snapshot();
        let path = normalize(&path);

        let expected = (1..=path.depth())
            .rev()
            .filter_map(|depth| path.key_of(0, depth))
            .find_map(|key| snapshot.lookup(&key).map(|id| (key, id)));

        match (MappingResolver::default().resolve(&path, &snapshot), expected) {
            (Resolution::Resolved { canon_id, matched_key }, Some((key, id))) => {
                prop_assert_eq!(canon_id, id);
                prop_assert_eq!(matched_key, key);
            }
            (Resolution::Unmapped, None) => {}
            (got, want) => prop_assert!(false, "resolved {:?}, expected {:?}", got, want),
        }
    }

    #[test]
    fn resolution_never_changes_the_snapshot(
        path in path_strategy(5),
        mappings in prop::collection::vec((path_strategy(3), 1u16..=113), 1..6),
    ) {
        let table = build_table(&mappings);
        let before = table.snapshot();
        let _ = MappingResolver::default().resolve(&normalize(&path), &before);
        let after = table.snapshot();
        prop_assert_eq!(before.version(), after.version());
        prop_assert_eq!(before.digest(), after.digest());
    }
}

#[test]
fn min_depth_limits_fallback() {
    let table = common::table_with(&[("Grocery", 1)]);
    let snapshot = table.snapshot();
    let path = normalize(&["Grocery", "Pantry", "Pasta"]);

    let loose = MappingResolver::default();
    assert_eq!(loose.resolve(&path, &snapshot).canon_id(), Some(common::id(1)));

    let strict = MappingResolver::new(ResolverConfig {
        min_depth: 2,
        root_segments_to_drop: 0,
    });
    assert_eq!(strict.resolve(&path, &snapshot), Resolution::Unmapped);
}

#[test]
fn empty_snapshot_resolves_nothing() {
    let table = common::table_with(&[]);
    let path = normalize(&["Grocery"]);
    assert_eq!(
        MappingResolver::default().resolve(&path, &table.snapshot()),
        Resolution::Unmapped
    );
}
