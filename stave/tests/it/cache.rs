//! Scan -> cache-key flow: the Cache Keyer hashing exactly the files the
//! Source Scanner found, so editing an unrelated file never invalidates the
//! cache and editing a scanned file always does.

use std::fs;

use crate::temporary_directory;

#[test]
fn editing_a_scanned_file_changes_the_cache_key() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("build.rs"),
        "// stave:target-file\n\npub fn build() {}\n",
    )
    .unwrap();
    let cache_dir = dir.path().join("cache");

    let files = stave::scan::scan(dir.path()).unwrap();
    let before = stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).unwrap();

    fs::write(
        dir.path().join("build.rs"),
        "// stave:target-file\n\npub fn build() { /* changed */ }\n",
    )
    .unwrap();
    let files = stave::scan::scan(dir.path()).unwrap();
    let after = stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).unwrap();

    assert_ne!(before.hash, after.hash);
}

#[test]
fn editing_an_untagged_sibling_file_does_not_change_the_cache_key() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("build.rs"),
        "// stave:target-file\n\npub fn build() {}\n",
    )
    .unwrap();
    fs::write(dir.path().join("README.rs.txt"), "not a stavefile").unwrap();
    let cache_dir = dir.path().join("cache");

    let files = stave::scan::scan(dir.path()).unwrap();
    let before = stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).unwrap();

    fs::write(dir.path().join("README.rs.txt"), "still not a stavefile, but edited").unwrap();
    let files = stave::scan::scan(dir.path()).unwrap();
    let after = stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).unwrap();

    assert_eq!(before.hash, after.hash);
}

#[test]
fn cache_entry_exists_reflects_whether_the_binary_has_been_built() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("build.rs"),
        "// stave:target-file\n\npub fn build() {}\n",
    )
    .unwrap();
    let cache_dir = dir.path().join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let entry = stave::cache::cache_key(&files, "cargo 1.80.0", &cache_dir).unwrap();
    assert!(!entry.exists());

    fs::write(&entry.binary_path, b"fake binary").unwrap();
    assert!(entry.exists());
}
