//! `InvocationConfig` resolution against a real filesystem, as opposed to
//! `config.rs`'s own unit tests which exercise `validate()` on hand-built
//! structs.

use std::path::PathBuf;

use pretty_assertions::assert_eq;

#[test]
fn absolute_leaves_an_already_absolute_path_untouched() {
    let absolute = PathBuf::from("/tmp/stave-config-test");
    assert_eq!(stave::config::absolute(&absolute), absolute);
}

#[test]
fn absolute_joins_a_relative_path_onto_the_current_directory() {
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(stave::config::absolute("stavefile.rs"), cwd.join("stavefile.rs"));
}

#[test]
fn default_cache_dir_honors_the_override_environment_variable() {
    // SAFETY: test-only var, not read concurrently by other tests in this
    // binary (integration test binaries run single-threaded per test file
    // unless `cargo test -- --test-threads` is overridden, and this var is
    // unique to this test).
    unsafe { std::env::set_var("STAVE_CACHE_DIR", "/tmp/stave-config-test-cache") };
    let dir = stave::config::InvocationConfig::default_cache_dir().unwrap();
    assert_eq!(dir, PathBuf::from("/tmp/stave-config-test-cache"));
    unsafe { std::env::remove_var("STAVE_CACHE_DIR") };
}
