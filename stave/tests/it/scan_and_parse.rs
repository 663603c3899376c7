//! Scan -> parse flow: the Source Scanner's file list feeding straight into
//! the Package Parser, the way `stave::run_invocation` chains them.

use std::fs;

use pretty_assertions::assert_eq;

use crate::temporary_directory;

#[test]
fn a_tagged_stavefile_yields_its_public_functions_as_targets() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("build.rs"),
        concat!(
            "// stave:target-file\n\n",
            "/// Builds the project.\n",
            "pub fn build(release: bool) {}\n\n",
            "fn helper() {}\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();

    assert_eq!(meta.targets.len(), 1);
    assert_eq!(meta.targets[0].fq_name(), "build");
    assert_eq!(meta.targets[0].doc_first_sentence(), "Builds the project.");
}

#[test]
fn namespace_methods_are_discovered_through_the_namespace_marker_trait() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("docker.rs"),
        concat!(
            "// stave:target-file\n\n",
            "pub struct Docker;\n\n",
            "impl stave_runtime::Namespace for Docker {}\n\n",
            "impl Docker {\n",
            "    /// Builds the image.\n",
            "    pub fn build(&self) {}\n",
            "}\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();

    assert_eq!(meta.targets.len(), 1);
    assert_eq!(meta.targets[0].fq_name(), "Docker:build");
    assert!(meta.targets[0].has_self);
}

#[test]
fn aliases_resolve_case_insensitively_to_the_target_they_name() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("status.rs"),
        concat!(
            "// stave:target-file\n\n",
            "pub const ALIASES: &[(&str, &str)] = &[(\"st\", \"Status\"), (\"stat\", \"Status\")];\n\n",
            "pub fn status() {}\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();

    assert_eq!(meta.aliases.get("st").map(String::as_str), Some("Status"));
    assert_eq!(meta.aliases.get("stat").map(String::as_str), Some("Status"));
}

#[test]
fn stave_import_merges_a_sibling_directorys_targets_under_a_namespace() {
    let dir = temporary_directory();
    let sub = dir.path().join("docker");
    fs::create_dir(&sub).unwrap();
    fs::write(
        sub.join("tasks.rs"),
        "// stave:target-file\n\npub fn build() {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.rs"),
        concat!(
            "// stave:target-file\n",
            "// stave:import docker as Docker\n\n",
            "pub fn test() {}\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();

    assert!(meta.find("test").is_some());
    assert!(meta.find("Docker:build").is_some());
}

#[test]
fn duplicate_target_names_across_files_are_a_parse_error() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("a.rs"),
        "// stave:target-file\n\npub fn build() {}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("b.rs"),
        "// stave:target-file\n\npub fn build(x: bool) {}\n",
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let err = stave::parse::parse_package(dir.path(), &files).unwrap_err();
    assert!(matches!(err, stave::error::StaveError::Parse { .. }));
}
