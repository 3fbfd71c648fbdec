use std::fs;

use chrono::TimeZone;
use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn write(dir: &TempDir, name: &str, body: &str) {
    fs::write(dir.path().join(name), body).expect("write migration file");
}

fn at(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, h, mi, s).unwrap()
}

#[rstest]
#[case("20260101000000_create_users.up.sql", Some((20_260_101_000_000, "create_users", Direction::Up)))]
#[case("3_add-index.down.sql", Some((3, "add-index", Direction::Down)))]
#[case("12_two_parts_name.up.sql", Some((12, "two_parts_name", Direction::Up)))]
#[case("README.md", None)]
#[case("abc_name.up.sql", None)]
#[case("1_name.sql", None)]
#[case("1_.up.sql", None)]
fn test_parse_file_name(#[case] input: &str, #[case] expected: Option<(i64, &str, Direction)>) {
    let parsed = parse_file_name(input).map(|p| (p.version.as_i64(), p.name, p.direction));
    let expected = expected.map(|(v, n, d)| (v, n.to_string(), d));
    assert_eq!(parsed, expected);
}

#[rstest]
#[case("create_users", "create_users")]
#[case("  add users table ", "add_users_table")]
#[case("fix-index", "fix-index")]
fn test_sanitize_name_accepts(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(sanitize_name(raw).unwrap(), expected);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("drop;table")]
#[case("../escape")]
#[case("naïve")]
fn test_sanitize_name_rejects(#[case] raw: &str) {
    assert!(matches!(sanitize_name(raw), Err(MigrationError::InvalidName(_))));
}

#[test]
fn test_list_missing_folder() {
    let dir = TempDir::new().unwrap();
    let repo = MigrationRepository::new(dir.path().join("nope"));

    assert!(matches!(repo.list(), Err(MigrationError::FolderNotFound(_))));
}

#[test]
fn test_list_groups_and_sorts() {
    let dir = TempDir::new().unwrap();
    write(&dir, "3_third.up.sql", "CREATE TABLE c ();");
    write(&dir, "1_first.up.sql", "CREATE TABLE a ();");
    write(&dir, "1_first.down.sql", "DROP TABLE a;");
    write(&dir, "2_second.up.sql", "CREATE TABLE b ();");
    write(&dir, "notes.txt", "ignored");
    fs::create_dir(dir.path().join("4_dir.up.sql")).unwrap();

    let migrations = MigrationRepository::new(dir.path()).list().unwrap();

    let versions: Vec<i64> = migrations.iter().map(|m| m.version.as_i64()).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert_eq!(migrations[0].name, "first");
    assert_eq!(migrations[0].down.as_deref(), Some("DROP TABLE a;"));
    assert!(migrations[0].is_reversible());
    assert!(!migrations[1].is_reversible());
    assert!(migrations[1].down_path.is_none());
}

#[test]
fn test_list_skips_down_only_version() {
    let dir = TempDir::new().unwrap();
    write(&dir, "1_orphan.down.sql", "DROP TABLE a;");
    write(&dir, "2_real.up.sql", "SELECT 1;");

    let migrations = MigrationRepository::new(dir.path()).list().unwrap();

    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].version, Version(2));
}

#[test]
fn test_list_blank_down_is_irreversible() {
    let dir = TempDir::new().unwrap();
    write(&dir, "1_init.up.sql", "SELECT 1;");
    write(&dir, "1_init.down.sql", "  \n");

    let migrations = MigrationRepository::new(dir.path()).list().unwrap();

    assert!(!migrations[0].is_reversible());
    assert!(migrations[0].down_path.is_some());
}

#[test]
fn test_list_duplicate_version_different_names() {
    let dir = TempDir::new().unwrap();
    write(&dir, "5_alpha.up.sql", "SELECT 1;");
    write(&dir, "5_beta.up.sql", "SELECT 2;");

    let err = MigrationRepository::new(dir.path()).list().unwrap_err();

    assert!(matches!(err, MigrationError::DuplicateVersion { version, .. } if version == Version(5)));
}

#[test]
fn test_list_duplicate_version_same_half() {
    let dir = TempDir::new().unwrap();
    write(&dir, "5_alpha.up.sql", "SELECT 1;");
    write(&dir, "05_alpha.up.sql", "SELECT 2;");

    let err = MigrationRepository::new(dir.path()).list().unwrap_err();

    assert!(matches!(err, MigrationError::DuplicateVersion { .. }));
}

#[test]
fn test_create_writes_stub_pair() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("migrations");
    let repo = MigrationRepository::new(&folder);

    let created = repo.create("add users", at(9, 30, 5)).unwrap();

    assert_eq!(created.version, Version(20_261_016_093_005));
    assert_eq!(created.name, "add_users");
    assert_eq!(
        created.up_path,
        folder.join("20261016093005_add_users.up.sql")
    );
    assert!(created.up_path.is_file());
    assert!(created.down_path.is_file());

    let listed = repo.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].up.contains("-- Migration: add_users"));
    assert!(listed[0].down_path.is_some());
    // the generated down file holds only comments
    assert!(!listed[0].is_reversible());
}

#[test]
fn test_list_comment_only_down_is_irreversible() {
    let dir = TempDir::new().unwrap();
    write(&dir, "1_init.up.sql", "CREATE TABLE a ();");
    write(&dir, "1_init.down.sql", "-- nothing yet\n\n   -- still nothing\n");

    let migrations = MigrationRepository::new(dir.path()).list().unwrap();

    assert!(!migrations[0].is_reversible());
}

#[test]
fn test_list_edited_stub_down_is_reversible() {
    let dir = TempDir::new().unwrap();
    let repo = MigrationRepository::new(dir.path());
    let created = repo.create("add widgets", at(8, 0, 0)).unwrap();
    let mut down = fs::read_to_string(&created.down_path).unwrap();
    down.push_str("DROP TABLE widgets; -- cleanup\n");
    fs::write(&created.down_path, down).unwrap();

    let listed = repo.list().unwrap();

    assert!(listed[0].is_reversible());
    assert!(listed[0].down.as_deref().unwrap().contains("DROP TABLE widgets;"));
}

#[rstest]
#[case("DROP TABLE a;", true)]
#[case("  -- header\nDROP TABLE a;", true)]
#[case("-- only\n-- comments\n", false)]
#[case("\n \t\n", false)]
#[case("", false)]
fn test_has_statements(#[case] body: &str, #[case] expected: bool) {
    assert_eq!(has_statements(body), expected);
}

#[test]
fn test_create_after_max_version_is_error() {
    let dir = TempDir::new().unwrap();
    write(&dir, &format!("{}_last.up.sql", i64::MAX), "SELECT 1;");
    let repo = MigrationRepository::new(dir.path());

    let err = repo.create("next", at(9, 0, 0)).unwrap_err();

    assert!(matches!(err, MigrationError::VersionExhausted(v) if v == Version(i64::MAX)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_create_bumps_past_existing_versions() {
    let dir = TempDir::new().unwrap();
    write(&dir, "20991231235959_future.up.sql", "SELECT 1;");
    let repo = MigrationRepository::new(dir.path());

    let first = repo.create("next", at(9, 0, 0)).unwrap();
    let second = repo.create("next", at(9, 0, 0)).unwrap();

    assert_eq!(first.version, Version(20_991_231_235_960));
    assert_eq!(second.version, Version(20_991_231_235_961));
}

#[test]
fn test_create_same_second_is_unique() {
    let dir = TempDir::new().unwrap();
    let repo = MigrationRepository::new(dir.path());

    let a = repo.create("one", at(10, 0, 0)).unwrap();
    let b = repo.create("two", at(10, 0, 0)).unwrap();

    assert!(b.version > a.version);
    assert_eq!(repo.list().unwrap().len(), 2);
}

#[test]
fn test_create_rejects_invalid_name_without_writing() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("m");
    let repo = MigrationRepository::new(&folder);

    assert!(matches!(
        repo.create("bad/name", at(1, 0, 0)),
        Err(MigrationError::InvalidName(_))
    ));
    assert!(!folder.exists());
}
