//! Package Parser (spec.md §4.B): extracts targets, namespaces, aliases,
//! the default target, doc comments, and stavefile imports from a set of
//! source files. Purely static — parses to a `syn` AST and never evaluates
//! or macro-expands stavefile code.

mod signature;

pub mod model;

pub use model::{ArgType, PackageMetadata, SigKind, StaveImport, Target, TargetSig};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use syn::spanned::Spanned;
use syn::{Item, Visibility};
use tracing::instrument;

use crate::error::StaveError;
use crate::scan;
use model::{first_sentence, SourceSpan};
use signature::signature_to_targetsig;

/// Parse every file in `files` (all belonging to one package directory) into
/// a single [`PackageMetadata`], resolving `stave:import` directives against
/// sibling subdirectories of `source_dir`.
#[instrument(skip_all, fields(source_dir = %source_dir.display(), files = files.len()))]
pub fn parse_package(source_dir: &Path, files: &[PathBuf]) -> Result<PackageMetadata, StaveError> {
    let mut meta = parse_files_only(files)?;
    resolve_imports(source_dir, &mut meta, &mut BTreeSet::new())?;
    Ok(meta)
}

/// Parse `files` without following imports — the building block
/// [`parse_package`] and the import resolver share.
fn parse_files_only(files: &[PathBuf]) -> Result<PackageMetadata, StaveError> {
    let mut meta = PackageMetadata::default();
    let mut default_candidate: Option<(String, SourceSpan)> = None;

    // First pass: every type implementing `stave_runtime::Namespace`, across
    // all files, since the marker impl may live in a different file than the
    // method impl block it marks.
    let mut namespace_types: BTreeSet<String> = BTreeSet::new();
    let mut parsed_files = Vec::with_capacity(files.len());
    for file in files {
        let contents = std::fs::read_to_string(file)
            .map_err(|err| parse_err(file, format!("reading file: {err}")))?;
        let ast = syn::parse_file(&contents).map_err(|err| parse_err(file, err.to_string()))?;
        collect_namespace_types(&ast, &mut namespace_types);
        parsed_files.push((file.clone(), contents, ast));
    }

    for (file, contents, ast) in &parsed_files {
        if meta.package_doc.is_empty() {
            let doc = doc_string(&ast.attrs);
            if !doc.is_empty() {
                meta.package_doc = doc;
            }
        }

        for item in &ast.items {
            match item {
                Item::Fn(f) if matches!(f.vis, Visibility::Public(_)) => {
                    let line = f.span().start().line;
                    let sig = signature_to_targetsig(&f.sig).map_err(|msg| parse_err(file, msg))?;
                    meta.targets.push(Target {
                        name: f.sig.ident.to_string(),
                        call_path: f.sig.ident.to_string(),
                        namespace: None,
                        has_self: false,
                        sig,
                        doc: doc_string(&f.attrs),
                        span: SourceSpan { file: file.clone(), line },
                    });
                }
                Item::Impl(imp) if imp.trait_.is_none() => {
                    let Some(type_name) = inherent_impl_type_name(imp) else { continue };
                    if !namespace_types.contains(&type_name) {
                        continue;
                    }
                    for impl_item in &imp.items {
                        let syn::ImplItem::Fn(method) = impl_item else { continue };
                        if !matches!(method.vis, Visibility::Public(_)) {
                            continue;
                        }
                        let line = method.span().start().line;
                        let sig =
                            signature_to_targetsig(&method.sig).map_err(|msg| parse_err(file, msg))?;
                        let has_self = matches!(method.sig.inputs.first(), Some(syn::FnArg::Receiver(_)));
                        meta.targets.push(Target {
                            name: method.sig.ident.to_string(),
                            call_path: format!("{type_name}::{}", method.sig.ident),
                            namespace: Some(type_name.clone()),
                            has_self,
                            sig,
                            doc: doc_string(&method.attrs),
                            span: SourceSpan { file: file.clone(), line },
                        });
                    }
                }
                Item::Const(c) if c.ident == "DEFAULT" => {
                    if let Some(value) = string_literal(&c.expr) {
                        let line = c.span().start().line;
                        default_candidate = Some((value, SourceSpan { file: file.clone(), line }));
                    }
                }
                Item::Const(c) if c.ident == "ALIASES" => {
                    extract_aliases(&c.expr, &mut meta.aliases);
                }
                Item::Static(s) if s.ident == "ALIASES" => {
                    extract_aliases(&s.expr, &mut meta.aliases);
                }
                _ => {}
            }
        }

        meta.imports.extend(collect_import_directives(file, contents)?);
    }

    check_unique_target_names(&meta.targets)?;

    if let Some((name, span)) = default_candidate {
        if meta.find(&name).is_none() {
            return Err(StaveError::Parse {
                file: span.file,
                message: format!("DEFAULT refers to unknown target {name:?}"),
            });
        }
        meta.default = Some(name);
    }

    for (alias, target) in meta.aliases.clone() {
        if meta.find(&target).is_none() {
            return Err(StaveError::Parse {
                file: files.first().cloned().unwrap_or_default(),
                message: format!("alias {alias:?} refers to unknown target {target:?}"),
            });
        }
    }

    Ok(meta)
}

/// Recursively resolve every `stave:import` directive in `meta`, merging the
/// imported package's targets (namespaced by the import's prefix, if any)
/// into `meta.targets`. `visited` guards against import cycles between
/// sibling directories.
fn resolve_imports(
    source_dir: &Path,
    meta: &mut PackageMetadata,
    visited: &mut BTreeSet<PathBuf>,
) -> Result<(), StaveError> {
    let imports = std::mem::take(&mut meta.imports);
    for import in imports {
        let import_dir = source_dir.join(&import.module_path);
        let canonical = import_dir
            .canonicalize()
            .unwrap_or_else(|_| import_dir.clone());
        if !visited.insert(canonical.clone()) {
            continue;
        }

        let files = scan::scan(&import_dir)?;
        let mut imported = parse_files_only(&files)?;
        resolve_imports(&import_dir, &mut imported, visited)?;

        for mut target in imported.targets {
            target.namespace = match (&import.namespace, &target.namespace) {
                (Some(prefix), Some(inner)) => Some(format!("{prefix}:{inner}")),
                (Some(prefix), None) => Some(prefix.clone()),
                (None, ns) => ns.clone(),
            };
            let fq = target.fq_name();
            if meta.find(&fq).is_some() {
                return Err(StaveError::Parse {
                    file: import.span.file.clone(),
                    message: format!(
                        "import of {:?} contributes {fq:?}, which is already defined",
                        import.module_path
                    ),
                });
            }
            meta.targets.push(target);
        }
    }
    Ok(())
}

fn parse_err(file: &Path, message: impl Into<String>) -> StaveError {
    StaveError::Parse {
        file: file.to_path_buf(),
        message: message.into(),
    }
}

/// spec.md §3 invariant: target names are case-insensitive-unique within a
/// package.
fn check_unique_target_names(targets: &[Target]) -> Result<(), StaveError> {
    let mut seen: BTreeMap<String, &Target> = BTreeMap::new();
    for target in targets {
        let key = target.fq_name().to_ascii_lowercase();
        if let Some(prior) = seen.insert(key, target) {
            return Err(StaveError::Parse {
                file: target.span.file.clone(),
                message: format!(
                    "duplicate target name {:?} (also declared at {}:{})",
                    target.fq_name(),
                    prior.span.file.display(),
                    prior.span.line
                ),
            });
        }
    }
    Ok(())
}

fn collect_namespace_types(ast: &syn::File, out: &mut BTreeSet<String>) {
    for item in &ast.items {
        let Item::Impl(imp) = item else { continue };
        let Some((_, path, _)) = &imp.trait_ else { continue };
        if path.segments.last().is_some_and(|seg| seg.ident == "Namespace") {
            if let Some(name) = type_ident(&imp.self_ty) {
                out.insert(name);
            }
        }
    }
}

fn inherent_impl_type_name(imp: &syn::ItemImpl) -> Option<String> {
    type_ident(&imp.self_ty)
}

fn type_ident(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(p) => p.path.segments.last().map(|seg| seg.ident.to_string()),
        _ => None,
    }
}

fn string_literal(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Lit(lit) => match &lit.lit {
            syn::Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        syn::Expr::Reference(r) => string_literal(&r.expr),
        _ => None,
    }
}

/// Walk `expr` looking for an array literal of `(alias, target)` string
/// tuples, however it's wrapped (`&[...]`, a plain array, etc.), and insert
/// each pair into `out` keyed by the lowercased alias (spec.md §4.B: alias
/// names are compared case-insensitively at dispatch time).
fn extract_aliases(expr: &syn::Expr, out: &mut BTreeMap<String, String>) {
    match expr {
        syn::Expr::Reference(r) => extract_aliases(&r.expr, out),
        syn::Expr::Array(arr) => {
            for elem in &arr.elems {
                if let syn::Expr::Tuple(tuple) = elem
                    && tuple.elems.len() == 2
                    && let (Some(alias), Some(target)) =
                        (string_literal(&tuple.elems[0]), string_literal(&tuple.elems[1]))
                {
                    out.insert(alias.to_ascii_lowercase(), target);
                }
            }
        }
        _ => {}
    }
}

/// Concatenate a Rust doc comment (`///`/`//!`, or `#[doc = "..."]`) into a
/// single string, one paragraph per attribute line, matching how `rustdoc`
/// itself joins adjacent doc attributes.
fn doc_string(attrs: &[syn::Attribute]) -> String {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let syn::Meta::NameValue(nv) = &attr.meta
            && let syn::Expr::Lit(lit) = &nv.value
            && let syn::Lit::Str(s) = &lit.lit
        {
            lines.push(s.value().trim().to_string());
        }
    }
    lines.join("\n")
}

/// `// stave:import <module> [as <Namespace>]` directives (spec.md §4.B).
/// Regular line comments aren't part of the `syn` AST, so these are scanned
/// directly from the source text, the same way [`crate::scan`] looks for
/// the build-tag sentinel.
fn collect_import_directives(file: &Path, contents: &str) -> Result<Vec<StaveImport>, StaveError> {
    const DIRECTIVE: &str = "// stave:import ";
    let mut out = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(DIRECTIVE) else { continue };
        let mut words = rest.split_whitespace();
        let Some(module_path) = words.next() else {
            return Err(parse_err(file, format!("malformed stave:import directive: {line:?}")));
        };
        let namespace = match words.next() {
            Some("as") => Some(words.next().map(str::to_string).ok_or_else(|| {
                parse_err(file, format!("stave:import missing namespace after `as`: {line:?}"))
            })?),
            Some(other) => {
                return Err(parse_err(
                    file,
                    format!("unexpected token {other:?} in stave:import directive: {line:?}"),
                ));
            }
            None => None,
        };
        out.push(StaveImport {
            module_path: module_path.trim_end_matches(';').to_string(),
            namespace,
            span: SourceSpan { file: file.to_path_buf(), line: idx + 1 },
        });
    }
    Ok(out)
}

/// First sentence of a package/target doc comment, exposed for the
/// Mainfile Generator's `--list` rendering.
pub fn summary(doc: &str) -> String {
    first_sentence(doc)
}
