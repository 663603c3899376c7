//! Compiler Driver (spec.md §4.E): turns a generated mainfile plus the
//! user's own source files into a compiled, cached binary.
//!
//! Shells out to `cargo build --release --manifest-path <dir>/Cargo.toml`
//! against a throwaway package written under the cache directory, the same
//! "generate a build plan, then hand it to a real `cargo` subprocess and
//! capture its output" shape as the teacher's own `cargo::invoke`/
//! `invoke_output` (`packages/hurry/src/cargo.rs`).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::{debug, instrument, trace};

use crate::cache::CacheEntry;
use crate::config::InvocationConfig;
use crate::error::StaveError;
use crate::mainfile::UserModule;

/// Path to the `stave-runtime` crate this `stave` binary was itself built
/// against, baked in at compile time the same way a workspace member locates
/// a sibling crate during development. A packaged release of `stave` would
/// instead vendor `stave-runtime`'s sources or publish it to a registry; this
/// keeps the generated package's `Cargo.toml` a `path` dependency for now,
/// which is sufficient for every `stave` invocation running from this
/// workspace's own `target/`.
const STAVE_RUNTIME_MANIFEST_DIR: &str = env!("CARGO_MANIFEST_DIR");

/// Render the throwaway Cargo package for `entry` under `cache_dir`, invoke
/// the host toolchain against it, and move the resulting binary to
/// `entry.binary_path`. Returns immediately without touching the filesystem
/// if the cached binary already exists and `force_rebuild` is false.
#[instrument(skip(mainfile_source, modules), fields(hash = %entry.hash.to_hex()))]
pub async fn compile(
    entry: &CacheEntry,
    mainfile_source: &str,
    modules: &[UserModule],
    config: &InvocationConfig,
) -> Result<(), StaveError> {
    if entry.exists() && !config.force_rebuild {
        debug!("cached binary already present; skipping compile");
        return Ok(());
    }

    let build_dir = build_dir_for(&config.cache_dir, entry);
    std::fs::create_dir_all(build_dir.join("src"))
        .map_err(|err| StaveError::Config(format!("creating {}: {err}", build_dir.display())))?;

    std::fs::write(build_dir.join("src/main.rs"), mainfile_source)
        .map_err(|err| StaveError::Config(format!("writing generated mainfile: {err}")))?;
    std::fs::write(build_dir.join("Cargo.toml"), manifest_toml(&entry.hash))
        .map_err(|err| StaveError::Config(format!("writing generated Cargo.toml: {err}")))?;

    let manifest_path = build_dir.join("Cargo.toml");
    let output = invoke_build(&manifest_path, config).await?;

    if !output.status.success() {
        std::fs::remove_dir_all(&build_dir).ok();
        return Err(StaveError::Compile {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let mut built = build_dir.join("target");
    if let Some(triple) = target_triple(config) {
        built = built.join(triple);
    }
    let built = built.join("release").join(package_name(&entry.hash));
    std::fs::create_dir_all(&config.cache_dir).map_err(|err| {
        StaveError::Config(format!("creating {}: {err}", config.cache_dir.display()))
    })?;
    let destination = config.compile_output.clone().unwrap_or_else(|| entry.binary_path.clone());
    std::fs::copy(&built, &destination).map_err(|err| {
        StaveError::Config(format!(
            "copying compiled binary from {} to {}: {err}",
            built.display(),
            destination.display()
        ))
    })?;

    if !config.keep_generated {
        std::fs::remove_dir_all(&build_dir).ok();
    }

    Ok(())
}

fn build_dir_for(cache_dir: &Path, entry: &CacheEntry) -> PathBuf {
    cache_dir.join(format!("{}-build", entry.hash.to_hex()))
}

fn package_name(hash: &blake3::Hash) -> String {
    format!("stave_target_{}", &hash.to_hex()[..16])
}

/// The `Cargo.toml` for the throwaway package: a single binary depending on
/// `stave-runtime` by path, plus the runtime crates the generated `main.rs`
/// itself calls directly (`tokio`, `tokio-util`, `signal-hook`) — those
/// aren't re-exported through `stave-runtime`'s own dependency edges, so the
/// generated crate needs them listed explicitly, same as any ordinary binary
/// crate would.
fn manifest_toml(hash: &blake3::Hash) -> String {
    let name = package_name(hash);
    let runtime_path = Path::new(STAVE_RUNTIME_MANIFEST_DIR)
        .parent()
        .map(|workspace_root| workspace_root.join("stave-runtime"))
        .unwrap_or_else(|| PathBuf::from("../stave-runtime"));

    format!(
        r#"[package]
name = {name:?}
version = "0.0.0"
edition = "2021"
publish = false

[[bin]]
name = {name:?}
path = "src/main.rs"

[dependencies]
stave-runtime = {{ path = {runtime_path:?} }}
tokio = {{ version = "1", features = ["full"] }}
tokio-util = "0.7"
signal-hook = "0.3"

[profile.release]
debug = false
"#,
        name = name,
        runtime_path = runtime_path.display().to_string(),
    )
}

/// Map `--goos`/`--goarch` to a Rust target triple, mirroring Go's
/// `GOOS`/`GOARCH` cross-compile flags (spec.md §6) onto the closest
/// equivalent `rustc` concept. Only consulted when `--compile` is set
/// (`InvocationConfig::validate` already rejects the flags otherwise).
fn target_triple(config: &InvocationConfig) -> Option<String> {
    config.compile_output.as_ref()?;
    let goos = config.goos.as_deref();
    let goarch = config.goarch.as_deref();
    if goos.is_none() && goarch.is_none() {
        return None;
    }
    let arch = match goarch {
        Some("amd64") | None => "x86_64",
        Some("arm64") => "aarch64",
        Some(other) => other,
    };
    let triple = match goos {
        Some("linux") | None => format!("{arch}-unknown-linux-gnu"),
        Some("darwin") => format!("{arch}-apple-darwin"),
        Some("windows") => format!("{arch}-pc-windows-gnu"),
        Some(other) => format!("{arch}-unknown-{other}"),
    };
    Some(triple)
}

#[instrument(skip(config), fields(manifest = %manifest_path.display()))]
async fn invoke_build(
    manifest_path: &Path,
    config: &InvocationConfig,
) -> Result<std::process::Output, StaveError> {
    let mut args: Vec<String> = vec![
        "build".to_string(),
        "--release".to_string(),
        "--manifest-path".to_string(),
        manifest_path.display().to_string(),
    ];

    if let Some(triple) = target_triple(config) {
        args.push("--target".to_string());
        args.push(triple);
    }

    trace!(?args, cmd = %config.toolchain_cmd, "invoke compiler");
    let mut cmd = tokio::process::Command::new(&config.toolchain_cmd);
    cmd.args(&args);
    if !config.ldflags.is_empty() {
        cmd.env("RUSTFLAGS", config.ldflags.join(" "));
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|err| {
        StaveError::Config(format!("could not spawn {}: {err}", config.toolchain_cmd))
    })?;
    child
        .wait_with_output()
        .await
        .map_err(|err| StaveError::Config(format!("compiler process failed: {err}")))
}

/// Toolchain version string used as a cache key input (spec.md §4.C):
/// `<cmd> --version`'s stdout, trimmed.
#[instrument(skip(cmd))]
pub async fn toolchain_version(cmd: impl AsRef<OsStr> + std::fmt::Debug) -> Result<String, StaveError> {
    let output = tokio::process::Command::new(cmd.as_ref())
        .arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|err| StaveError::Config(format!("could not run {cmd:?} --version: {err}")))?;
    if !output.status.success() {
        return Err(StaveError::Config(format!("{cmd:?} --version exited nonzero")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
