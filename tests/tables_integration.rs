use regex::Regex;
use std::path::Path;
use tempfile::TempDir;
use verscout::planner;
use verscout::tables::builder::{self, WalkFilters};
use verscout::tables::store::{self, StoreError, TableCache};
use verscout::tables::{Tables, group_key};
use verscout::version::Version;

fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Three releases of a small app: a changelog that moves every release, a
/// logo that never changes, an admin script that changed in 1.2 only, and
/// some content that must be excluded from fingerprinting.
fn sample_release_trees() -> TempDir {
    let base = TempDir::new().unwrap();
    for version in ["1.0", "1.1", "1.2"] {
        let root = base.path().join(format!("exampleapp-{version}"));
        write_file(&root, "CHANGELOG", &format!("changes in {version}\n"));
        write_file(&root, "static/logo.gif", "GIF89a-pretend-logo");
        let admin = if version == "1.2" { "var admin = 2;" } else { "var admin = 1;" };
        write_file(&root, "js/admin.js", admin);
        write_file(&root, "index.php", "<?php echo 'never fetchable statically'; ?>");
        write_file(&root, "cache/junk.txt", &format!("cache droppings {version}"));
    }
    std::fs::create_dir_all(base.path().join("not-a-release")).unwrap();
    base
}

fn build(base: &TempDir) -> Tables {
    let version_directory_regex = Regex::new(r"exampleapp-([\d.]+)").unwrap();
    let filters = WalkFilters {
        directory_exclude: Some(Regex::new(r"cache").unwrap()),
        file_exclude: Some(Regex::new(r".*\.php$").unwrap()),
    };
    builder::compute_tables(base.path(), &version_directory_regex, &filters).unwrap()
}

#[test]
fn build_produces_consistent_dual_indices() {
    let base = sample_release_trees();
    let tables = build(&base);

    tables.validate().unwrap();
    let versions: Vec<&str> = tables.all_versions.iter().map(Version::as_str).collect();
    assert_eq!(versions, ["1.0", "1.1", "1.2"]);

    // the changelog discriminates every release
    let changelog = &tables.path_index["/CHANGELOG"];
    assert_eq!(changelog.len(), 3);
    assert!(changelog.values().all(|versions| versions.len() == 1));

    // the logo never changes, so one hash covers the whole universe
    let logo = &tables.path_index["/static/logo.gif"];
    assert_eq!(logo.len(), 1);
    let (logo_hash, logo_versions) = logo.iter().next().unwrap();
    assert_eq!(group_key(logo_versions), "1.0,1.1,1.2");
    assert!(
        tables.version_index["1.0,1.1,1.2"]
            .contains(&("/static/logo.gif".to_string(), logo_hash.clone()))
    );

    // admin.js splits the universe into {1.0, 1.1} and {1.2}
    let admin = &tables.path_index["/js/admin.js"];
    assert_eq!(admin.len(), 2);
    assert!(tables.version_index.contains_key("1.0,1.1"));
}

#[test]
fn excluded_files_and_directories_never_reach_the_index() {
    let base = sample_release_trees();
    let tables = build(&base);
    assert!(!tables.path_index.contains_key("/index.php"));
    assert!(!tables.path_index.contains_key("/cache/junk.txt"));
}

#[test]
fn hashes_cover_contents_and_relative_path() {
    let base = sample_release_trees();
    let tables = build(&base);

    let expected = {
        let mut input = b"changes in 1.1\n".to_vec();
        input.extend_from_slice(b"/CHANGELOG");
        format!("{:x}", md5::compute(input))
    };
    assert_eq!(builder::file_hash(b"changes in 1.1\n", "/CHANGELOG"), expected);
    assert!(tables.path_index["/CHANGELOG"].contains_key(&expected));
    assert_eq!(tables.path_index["/CHANGELOG"][&expected], vec![Version::new("1.1")]);
}

#[test]
fn building_twice_is_byte_deterministic() {
    let base = sample_release_trees();
    let first = build(&base);
    let second = build(&base);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[test]
fn save_load_round_trips() {
    let base = sample_release_trees();
    let tables = build(&base);

    let dbs = TempDir::new().unwrap();
    let db_path = dbs.path().join("exampleapp.pkl");
    store::save_tables(&db_path, &tables).unwrap();
    let loaded = store::load_tables(&db_path).unwrap();
    assert_eq!(loaded, tables);
}

#[test]
fn cache_returns_the_same_tables_for_the_same_file() {
    let base = sample_release_trees();
    let tables = build(&base);

    let dbs = TempDir::new().unwrap();
    let db_path = dbs.path().join("exampleapp.pkl");
    store::save_tables(&db_path, &tables).unwrap();

    let cache = TableCache::new();
    let first = cache.load(&db_path).unwrap();
    let second = cache.load(&db_path).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn load_rejects_garbage_and_tampered_blobs() {
    let dbs = TempDir::new().unwrap();

    let garbage = dbs.path().join("garbage.pkl");
    std::fs::write(&garbage, b"not a table blob").unwrap();
    assert!(matches!(store::load_tables(&garbage), Err(StoreError::Format { .. })));

    // valid JSON whose indices have drifted apart
    let base = sample_release_trees();
    let mut tables = build(&base);
    tables.version_index.remove("1.0,1.1,1.2");
    let tampered = dbs.path().join("tampered.pkl");
    std::fs::write(&tampered, serde_json::to_vec(&tables).unwrap()).unwrap();
    assert!(matches!(store::load_tables(&tampered), Err(StoreError::Corrupt { .. })));
}

#[test]
fn build_fails_without_matching_release_directories() {
    let empty = TempDir::new().unwrap();
    let regex = Regex::new(r"exampleapp-([\d.]+)").unwrap();
    let result = builder::compute_tables(empty.path(), &regex, &WalkFilters::default());
    assert!(result.is_err());
}

#[test]
fn planner_ranks_the_changelog_first_on_the_built_tables() {
    let base = sample_release_trees();
    let tables = build(&base);

    let ranked = planner::pick_fingerprint_files(&tables.path_index, &tables.all_versions);
    assert_eq!(ranked.len(), tables.path_index.len());
    assert_eq!(ranked[0], "/CHANGELOG");

    // the logo is in every release, so it qualifies as an indicator
    let indicators = planner::pick_indicator_files(&tables.version_index, &tables.all_versions);
    assert!(indicators.contains(&"/static/logo.gif".to_string()));
}
