//! Data model produced by the Package Parser (spec.md §3 "Target", "Package
//! Metadata"), elaborated for Rust per SPEC_FULL.md §3: a target's signature
//! is represented statically as a [`TargetSig`] rather than carried at
//! runtime as reflection data (Rust has none), since it's only ever
//! serialized into the generated mainfile as match arms.

use std::path::PathBuf;

pub use stave_runtime::args::ArgType;

/// One of the four signature categories a target's parameter/return shape
/// can fall into (spec.md §3): whether it accepts an explicit cancellation
/// context as its first parameter, and whether it can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigKind {
    /// `fn(args...)`
    Bare,
    /// `fn(args...) -> Result<(), stave_runtime::FatalError>`
    Err,
    /// `fn(ctx: CancellationToken, args...)`
    Ctx,
    /// `fn(ctx: CancellationToken, args...) -> Result<(), stave_runtime::FatalError>`
    CtxErr,
}

impl SigKind {
    pub fn takes_ctx(self) -> bool {
        matches!(self, SigKind::Ctx | SigKind::CtxErr)
    }

    pub fn fallible(self) -> bool {
        matches!(self, SigKind::Err | SigKind::CtxErr)
    }
}

/// A target function's parameter/return shape, independent of its name.
#[derive(Debug, Clone)]
pub struct TargetSig {
    pub kind: SigKind,
    /// Declared argument types, excluding the leading context parameter (if
    /// any) and excluding a variadic tail (tracked separately).
    pub args: Vec<ArgType>,
    /// The type of a trailing `Vec<T>`/`&[T]` parameter, if the target
    /// accepts a variadic tail of one primitive type.
    pub variadic: Option<ArgType>,
    /// Whether the target function is declared `async`.
    pub is_async: bool,
}

impl TargetSig {
    /// Number of required (non-variadic) positional arguments.
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Where a target was declared, for parser diagnostics.
#[derive(Debug, Clone)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub line: usize,
}

/// One runnable build step (spec.md §3 "Target").
#[derive(Debug, Clone)]
pub struct Target {
    /// The function's own name, e.g. `Build` — without namespace prefix.
    pub name: String,
    /// The Rust path to call: either a bare function path (`crate::Build`)
    /// or a namespace method path (`crate::Docker::build`).
    pub call_path: String,
    /// Namespace prefix, if this target is a method on a type implementing
    /// [`stave_runtime::Namespace`].
    pub namespace: Option<String>,
    /// Whether the target is a method taking a `self`/`&self`/`&mut self`
    /// receiver (as opposed to a free function or associated function) —
    /// the Mainfile Generator needs this to emit `Type.method(args)` rather
    /// than `Type::method(args)`.
    pub has_self: bool,
    pub sig: TargetSig,
    /// The target's doc comment, if any (used for `--list`/`--help`).
    pub doc: String,
    pub span: SourceSpan,
}

impl Target {
    /// The fully-qualified symbolic name (e.g. `NS:Build`), matching
    /// spec.md's `NS:Build` notation. Target names are
    /// case-insensitive-unique within a package (spec.md §3 invariant).
    pub fn fq_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The first sentence of [`Self::doc`], for `--list` rendering
    /// (spec.md §4.D).
    pub fn doc_first_sentence(&self) -> String {
        first_sentence(&self.doc)
    }
}

pub fn first_sentence(doc: &str) -> String {
    let doc = doc.trim();
    match doc.find(". ") {
        Some(idx) => doc[..=idx].trim_end().to_string(),
        None => doc.lines().next().unwrap_or_default().trim().to_string(),
    }
}

/// A `// stave:import <module> [as <Namespace>]` directive (spec.md §4.B
/// "Stavefile imports").
#[derive(Debug, Clone)]
pub struct StaveImport {
    /// Module path relative to the importing package's source directory,
    /// e.g. `docker` for `mod docker;`.
    pub module_path: String,
    /// Namespace prefix applied to every target the imported package
    /// contributes, if any.
    pub namespace: Option<String>,
    pub span: SourceSpan,
}

/// The output of parsing one stavefile package (spec.md §3 "Package
/// Metadata").
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    /// Ordered list of targets, in declaration order across files (sorted by
    /// file path, then source position).
    pub targets: Vec<Target>,
    /// `fq_name -> Target` of the target named by a top-level `DEFAULT`
    /// const, if any.
    pub default: Option<String>,
    /// Alias name (lowercased) -> target `fq_name`, compared
    /// case-insensitively at dispatch time (spec.md §4.B).
    pub aliases: std::collections::BTreeMap<String, String>,
    /// The package doc comment (`//!` comments at the top of any scanned
    /// file).
    pub package_doc: String,
    pub imports: Vec<StaveImport>,
}

impl PackageMetadata {
    /// Look up a target by its fully-qualified name, case-insensitively.
    pub fn find(&self, fq_name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.fq_name().eq_ignore_ascii_case(fq_name))
    }
}
