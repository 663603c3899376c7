//! Scan -> parse -> generate flow: the Mainfile Generator operating on real
//! parsed packages instead of hand-built [`stave::parse::model::PackageMetadata`]
//! fixtures.

use std::fs;

use crate::temporary_directory;

#[test]
fn a_default_target_with_aliases_generates_a_dispatcher_with_matching_arms() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("status.rs"),
        concat!(
            "// stave:target-file\n\n",
            "pub const DEFAULT: &str = \"Status\";\n",
            "pub const ALIASES: &[(&str, &str)] = &[(\"st\", \"Status\"), (\"stat\", \"Status\")];\n\n",
            "/// Prints the current status.\n",
            "pub async fn status() -> Result<(), stave_runtime::FatalError> {\n",
            "    println!(\"alias!\");\n",
            "    Ok(())\n",
            "}\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();
    let rendered = stave::mainfile::generate(&meta, &files).unwrap();

    // The generated dispatcher must carry the build-tag sentinel as its
    // first line so it compiles alongside the user's own tagged files
    // (spec.md §6 "Build tag contract").
    assert!(rendered.starts_with("// stave:target-file\n"));

    // S1 alias dispatch: both "st" and "stat" must resolve to the same
    // dispatch function as the canonical target name.
    assert!(rendered.contains("\"st\" => Some(__stave_dispatch_status"));
    assert!(rendered.contains("\"stat\" => Some(__stave_dispatch_status"));
    assert!(rendered.contains("\"status\" => Some(__stave_dispatch_status"));
    assert!(rendered.contains("const HAS_DEFAULT: bool = true"));

    syn::parse_file(&rendered).expect("generated mainfile must be syntactically valid Rust");
}

#[test]
fn a_namespace_method_is_rendered_behind_a_closure_wrapper() {
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
    let rendered = stave::mainfile::generate(&meta, &files).unwrap();

    assert!(rendered.contains("move ||"));
    syn::parse_file(&rendered).expect("generated mainfile must be syntactically valid Rust");
}

#[test]
fn a_variadic_target_consumes_trailing_tokens_up_to_the_next_known_target() {
    let dir = temporary_directory();
    fs::write(
        dir.path().join("tag.rs"),
        concat!(
            "// stave:target-file\n\n",
            "pub async fn tag(names: Vec<String>) -> Result<(), stave_runtime::FatalError> { Ok(()) }\n",
            "pub async fn push() -> Result<(), stave_runtime::FatalError> { Ok(()) }\n",
        ),
    )
    .unwrap();

    let files = stave::scan::scan(dir.path()).unwrap();
    let meta = stave::parse::parse_package(dir.path(), &files).unwrap();
    let rendered = stave::mainfile::generate(&meta, &files).unwrap();

    assert!(rendered.contains("let known = known_tokens();"));
    syn::parse_file(&rendered).expect("generated mainfile must be syntactically valid Rust");
}
