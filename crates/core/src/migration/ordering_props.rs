//! Property-based tests for migration ordering.
//!
//! Discovery order never depends on directory enumeration, and `migrate`
//! never applies a version twice or below the latest applied one.

use std::collections::BTreeSet;
use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use super::fake::FakeTarget;
use super::repository::MigrationRepository;
use super::service::MigrationService;

/// Strategy for a set of distinct versions, in random order.
fn shuffled_versions() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(1i64..1_000_000, 1..20)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

fn write_folder(versions: &[i64]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for v in versions {
        fs::write(dir.path().join(format!("{v}_m.up.sql")), "SELECT 1;").unwrap();
        fs::write(dir.path().join(format!("{v}_m.down.sql")), "SELECT 1;").unwrap();
    }
    dir
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Listing is strictly ascending whatever order the files were written in.
    #[test]
    fn prop_list_strictly_ascending(versions in shuffled_versions()) {
        let dir = write_folder(&versions);

        let listed: Vec<i64> = MigrationRepository::new(dir.path())
            .list()
            .unwrap()
            .iter()
            .map(|m| m.version.as_i64())
            .collect();

        let expected: Vec<i64> = versions.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(listed, expected);
    }

    /// `migrate` applies exactly the versions above the latest applied one,
    /// ascending, and a second run applies nothing.
    #[test]
    fn prop_migrate_applies_only_newer(
        versions in shuffled_versions(),
        applied_count in 0usize..5,
    ) {
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        let already: Vec<i64> = sorted.iter().copied().take(applied_count).collect();
        let latest = already.last().copied();

        let dir = write_folder(&versions);
        let svc = MigrationService::new(
            MigrationRepository::new(dir.path()),
            FakeTarget::with_applied(&already),
        );

        let first = block_on(svc.migrate()).unwrap();
        let applied: Vec<i64> = first.applied.iter().map(|m| m.version.as_i64()).collect();
        let expected: Vec<i64> = sorted
            .iter()
            .copied()
            .filter(|v| latest.is_none_or(|l| *v > l))
            .collect();
        prop_assert_eq!(applied, expected);
        prop_assert_eq!(svc.target().applied(), sorted.clone());

        let second = block_on(svc.migrate()).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(svc.target().applied(), sorted);
    }
}
