//! Mainfile Generator (spec.md §4.D): emits the dispatcher source file that,
//! compiled alongside the user's stavefiles, becomes the cached binary.
//!
//! Built as a `proc_macro2::TokenStream` via `quote!` and rendered to text
//! with `prettyplease`. The Package Parser (`stave::parse`) never evaluates
//! stavefile code; this module is the only place target metadata turns back
//! into Rust source.

use std::path::{Path, PathBuf};

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use tracing::instrument;

use crate::error::StaveError;
use crate::parse::model::{ArgType, PackageMetadata, SigKind, Target};

/// The Cache Keyer (spec.md §4.C) hashes this constant as "the template"
/// (SPEC_FULL.md §3) instead of the per-invocation rendered output: it's the
/// literal source of the generator itself, so any change to the
/// dispatcher's *shape* changes this constant's bytes automatically,
/// without relying on every such change remembering to bump
/// [`crate::cache::REBUILD_EPOCH`] by hand.
pub const TEMPLATE_SOURCE: &str = include_str!("mainfile.rs");

/// One user source file, as seen by the generator: its absolute path (for
/// the `#[path = "..."]` module declaration) and the module identifier
/// derived from its file stem.
#[derive(Debug, Clone)]
pub struct UserModule {
    pub ident: String,
    pub path: PathBuf,
}

/// Derive the module identifiers the generated `main.rs` will declare for
/// `files`, one per source file, in the same order.
pub fn user_modules(files: &[PathBuf]) -> Vec<UserModule> {
    files
        .iter()
        .map(|path| UserModule {
            ident: module_ident_string(path),
            path: path.clone(),
        })
        .collect()
}

/// Sanitize a file's stem into a valid Rust module identifier, prefixing a
/// leading underscore when the stem starts with a digit or collides with a
/// keyword-shaped name, and disambiguating collisions between sibling
/// stavefile directories by folding any character invalid in an identifier
/// to `_`.
fn module_ident_string(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stavefile");
    let mut out = String::with_capacity(stem.len() + 1);
    for (idx, ch) in stem.chars().enumerate() {
        if ch.is_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
        if idx == 0 && ch.is_ascii_digit() {
            out.insert(0, '_');
        }
    }
    if out.is_empty() {
        out.push_str("stavefile");
    }
    format!("__stave_user_{out}")
}

/// Generate the dispatcher's `main.rs` source for `meta`, given the already
/// scanned `files` it was parsed from (used to derive the `#[path]` module
/// declarations the user's own code is compiled through).
#[instrument(skip_all, fields(targets = meta.targets.len(), files = files.len()))]
pub fn generate(meta: &PackageMetadata, files: &[PathBuf]) -> Result<String, StaveError> {
    let modules = user_modules(files);

    let mod_decls = modules.iter().map(|m| {
        let ident = format_ident!("{}", m.ident);
        let path_str = m.path.to_string_lossy().into_owned();
        quote! {
            #[path = #path_str]
            mod #ident;
        }
    });

    let dispatch_fns = meta
        .targets
        .iter()
        .map(|t| dispatch_fn(t, &modules))
        .collect::<Result<Vec<_>, _>>()?;

    let resolve_arms = meta.targets.iter().map(|t| {
        let token = t.fq_name().to_ascii_lowercase();
        let dispatch_ident = dispatch_ident(t);
        quote! { #token => Some(#dispatch_ident(rest)), }
    });
    let alias_arms = meta.aliases.iter().map(|(alias, target)| {
        let Some(target) = meta.find(target) else {
            return TokenStream::new();
        };
        let dispatch_ident = dispatch_ident(target);
        quote! { #alias => Some(#dispatch_ident(rest)), }
    });

    let list_entries = meta.targets.iter().map(|t| {
        let fq = t.fq_name();
        let doc = t.doc_first_sentence();
        let is_default = meta.default.as_deref() == Some(t.fq_name().as_str());
        quote! { (#fq, #doc, #is_default) }
    });

    let help_entries = meta.targets.iter().map(|t| {
        let fq = t.fq_name();
        let doc = t.doc.clone();
        let usage = usage_line(t);
        let aliases: Vec<&str> = meta
            .aliases
            .iter()
            .filter(|(_, target)| target.eq_ignore_ascii_case(&fq))
            .map(|(alias, _)| alias.as_str())
            .collect();
        let aliases_joined = aliases.join(", ");
        quote! { (#fq, #doc, #usage, #aliases_joined) }
    });

    let package_doc = meta.package_doc.clone();
    let default_token = meta
        .default
        .as_ref()
        .map(|d| d.to_ascii_lowercase())
        .unwrap_or_default();
    let has_default = meta.default.is_some();

    let tokens = quote! {
        #![allow(dead_code, unused_imports, unused_mut, clippy::all)]

        #(#mod_decls)*

        const PACKAGE_DOC: &str = #package_doc;
        const DEFAULT_TOKEN: &str = #default_token;
        const HAS_DEFAULT: bool = #has_default;
        const TARGET_LIST: &[(&str, &str, bool)] = &[ #(#list_entries),* ];
        const TARGET_HELP: &[(&str, &str, &str, &str)] = &[ #(#help_entries),* ];

        #(#dispatch_fns)*

        /// Resolve one argv token (target name, namespace-qualified name, or
        /// alias, compared case-insensitively per spec.md §4.B) to a bound
        /// target and the number of `rest` entries it consumed.
        fn resolve_token(
            token: &str,
            rest: &[String],
        ) -> Option<Result<(stave_runtime::BoundFn, usize), String>> {
            match token.to_ascii_lowercase().as_str() {
                #(#resolve_arms)*
                #(#alias_arms)*
                _ => None,
            }
        }

        fn print_list() {
            println!("{}", PACKAGE_DOC.lines().next().unwrap_or_default());
            for (name, summary, is_default) in TARGET_LIST {
                let marker = if *is_default { "*" } else { " " };
                println!("{marker} {name:<24} {summary}");
            }
        }

        fn print_help(target: &str) -> std::process::ExitCode {
            let normalized = target.to_ascii_lowercase();
            for (name, doc, usage, aliases) in TARGET_HELP {
                if name.eq_ignore_ascii_case(&normalized) {
                    if !doc.is_empty() {
                        println!("{doc}");
                        println!();
                    }
                    println!("Usage: stave {usage}");
                    if !aliases.is_empty() {
                        println!("Aliases: {aliases}");
                    }
                    return std::process::ExitCode::SUCCESS;
                }
            }
            eprintln!("stave: unknown target {target:?}");
            std::process::ExitCode::from(2)
        }

        fn known_tokens() -> std::collections::HashSet<&'static str> {
            let mut set: std::collections::HashSet<&'static str> =
                TARGET_LIST.iter().map(|(name, _, _)| *name).collect();
            set.extend(TARGET_HELP.iter().map(|(name, ..)| *name));
            set
        }

        /// Parse the full `argv` remainder (after flags) into the ordered
        /// list of outermost target invocations (spec.md §4.D: `[target]
        /// [arg…] [target] [arg…] …`).
        fn parse_argv(argv: &[String]) -> Result<Vec<(String, stave_runtime::BoundFn)>, String> {
            let mut out = Vec::new();
            let mut i = 0;
            while i < argv.len() {
                let token = argv[i].clone();
                let rest = &argv[i + 1..];
                match resolve_token(&token, rest) {
                    Some(Ok((bound, consumed))) => {
                        out.push((token, bound));
                        i += 1 + consumed;
                    }
                    Some(Err(message)) => return Err(message),
                    None => return Err(format!("unknown target {token:?}")),
                }
            }
            Ok(out)
        }

        fn default_invocation() -> Option<(String, stave_runtime::BoundFn)> {
            if !HAS_DEFAULT {
                return None;
            }
            match resolve_token(DEFAULT_TOKEN, &[]) {
                Some(Ok((bound, _))) => Some((DEFAULT_TOKEN.to_string(), bound)),
                _ => None,
            }
        }

        /// Run every outermost target concurrently, each under its own
        /// cancellation context so a filesystem event or SIGINT only tears
        /// down the target(s) it actually affects (spec.md §4.H, §5).
        async fn run_outermost(
            invocations: Vec<(String, stave_runtime::BoundFn)>,
            sigint: tokio_util::sync::CancellationToken,
        ) -> std::process::ExitCode {
            let mut handles = Vec::with_capacity(invocations.len());
            for (name, bound) in invocations {
                let identity = bound.identity().clone();
                stave_runtime::watch::WatchSupervisor::mark_outermost(identity.clone());
                let sigint = sigint.clone();
                handles.push(tokio::spawn(run_one_outermost(name, bound, identity, sigint)));
            }

            let mut exit_code = 0;
            for handle in handles {
                let code = handle.await.unwrap_or(1);
                if exit_code == 0 && code != 0 {
                    exit_code = code;
                }
            }
            std::process::ExitCode::from(exit_code as u8)
        }

        async fn run_one_outermost(
            name: String,
            bound: stave_runtime::BoundFn,
            identity: stave_runtime::FnIdentity,
            sigint: tokio_util::sync::CancellationToken,
        ) -> i32 {
            let result = stave_runtime::evaluator::ctx_deps(sigint.clone(), vec![bound]).await;
            let mut code = match &result {
                Ok(()) => 0,
                Err(err) => exit_code_for(err),
            };

            if stave_runtime::watch::WatchSupervisor::is_watch_active(&identity) {
                tracing::info!(target = %name, "entering watch mode");
                let _ = stave_runtime::watch::WatchSupervisor::run_forever(
                    identity.clone(),
                    sigint,
                    move || resolve_token(&name, &[]).and_then(Result::ok).map(|(b, _)| b).unwrap(),
                )
                .await;
                code = 0;
            }
            code
        }

        fn exit_code_for(err: &stave_runtime::RuntimeError) -> i32 {
            match err {
                stave_runtime::RuntimeError::Fatal(f) => f.code,
                stave_runtime::RuntimeError::Cycle { .. } => 1,
                stave_runtime::RuntimeError::Cancelled => 0,
            }
        }

        fn main() -> std::process::ExitCode {
            stave_runtime::dryrun::latch_dry_run_flags();

            if std::env::var_os("STAVE_LIST").is_some() {
                print_list();
                return std::process::ExitCode::SUCCESS;
            }
            if let Ok(target) = std::env::var("STAVE_HELP") {
                return print_help(&target);
            }

            let argv: Vec<String> = std::env::args().skip(1).collect();
            let invocations = match parse_argv(&argv) {
                Ok(invocations) if !invocations.is_empty() => invocations,
                Ok(_) => match default_invocation() {
                    Some(invocation) => vec![invocation],
                    None => {
                        eprintln!("stave: no target specified and no default target defined");
                        return std::process::ExitCode::from(2);
                    }
                },
                Err(message) => {
                    eprintln!("stave: {message}");
                    return std::process::ExitCode::from(2);
                }
            };

            let sigint = tokio_util::sync::CancellationToken::new();
            let runtime = tokio::runtime::Runtime::new().expect("start tokio runtime");
            let _guard = runtime.enter();

            {
                let sigint = sigint.clone();
                // SAFETY: the handler only touches an atomic-backed token via
                // `CancellationToken::cancel`, which is async-signal-safe in
                // the sense that matters here (no allocation on the signal
                // path itself — `cancel` just flips a shared flag).
                let _ = unsafe {
                    signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
                        sigint.cancel();
                    })
                };
            }

            runtime.block_on(run_outermost(invocations, sigint))
        }
    };

    let rendered = render(tokens)?;
    // `quote!`'s token stream can't carry a plain `//` line comment through to
    // the rendered source (the lexer strips it before the macro body ever
    // sees it, unlike a `///`/`//!` doc comment), so the build-tag sentinel
    // is prepended here instead, as a literal first line.
    Ok(format!("// stave:target-file\n{rendered}"))
}

/// Parse `tokens` back into a `syn::File` and pretty-print it, so the
/// compiled binary's cache key is insensitive to `quote!`'s own whitespace
/// choices and `--keep`-retained files are readable.
fn render(tokens: TokenStream) -> Result<String, StaveError> {
    let file = syn::parse2::<syn::File>(tokens).map_err(|err| StaveError::Config(format!(
        "internal error: generated mainfile failed to parse: {err}"
    )))?;
    Ok(prettyplease::unparse(&file))
}

fn dispatch_ident(target: &Target) -> proc_macro2::Ident {
    format_ident!("__stave_dispatch_{}", sanitize_ident(&target.fq_name()))
}

fn sanitize_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// A human-readable usage fragment for `--help`, e.g. `build [release:bool]
/// [count:int]` or, for a variadic tail, `tag [names:string...]`.
fn usage_line(target: &Target) -> String {
    let mut parts = vec![target.fq_name()];
    for arg in &target.sig.args {
        parts.push(format!("[{arg}]"));
    }
    if let Some(variadic) = target.sig.variadic {
        parts.push(format!("[{variadic}...]"));
    }
    parts.join(" ")
}

fn rust_type_tokens(arg: ArgType) -> TokenStream {
    match arg {
        ArgType::Str => quote! { String },
        ArgType::Int => quote! { i64 },
        ArgType::Float => quote! { f64 },
        ArgType::Bool => quote! { bool },
        ArgType::Duration => quote! { std::time::Duration },
    }
}

fn parse_expr(arg: ArgType, token_expr: TokenStream) -> TokenStream {
    match arg {
        ArgType::Str => quote! { stave_runtime::args::parse_str(#token_expr) },
        ArgType::Int => quote! { stave_runtime::args::parse_int(#token_expr).map_err(|e| e.to_string())? },
        ArgType::Float => quote! { stave_runtime::args::parse_float(#token_expr).map_err(|e| e.to_string())? },
        ArgType::Bool => quote! { stave_runtime::args::parse_bool(#token_expr).map_err(|e| e.to_string())? },
        ArgType::Duration => {
            quote! { stave_runtime::args::parse_duration(#token_expr).map_err(|e| e.to_string())? }
        }
    }
}

/// Build the module path expression that *references* (without calling) a
/// target's function item, when that's possible without constructing a
/// receiver value — i.e. everything except a namespace method declared with
/// an explicit `self` parameter, which needs `Type.method(args)` dot-call
/// syntax instead of a bare function-item value.
fn direct_fn_path(target: &Target, module: &proc_macro2::Ident) -> Option<TokenStream> {
    if target.has_self {
        return None;
    }
    let segments: Vec<&str> = target.call_path.split("::").collect();
    let idents = segments.iter().map(|s| format_ident!("{s}"));
    Some(quote! { #module::#(#idents)::* })
}

/// Build the generated dispatch function for one target: parses its
/// arguments out of `rest`, constructs a [`stave_runtime::BoundFn`], and
/// returns how many `rest` entries were consumed.
///
/// Whenever possible (an `async fn` target returning `Result<(),
/// stave_runtime::FatalError>`, referenced without an intervening self
/// receiver), the function item itself is passed to `bind::f`/`bind::bare`
/// so its [`stave_runtime::FnIdentity`] matches whatever a user's own
/// `Deps`/`F` call referencing the same function would compute — keeping
/// CLI-outermost invocation and in-graph dependency references deduped
/// against the same once-slot (spec.md §8 invariant 1). Namespace methods
/// declared with a `self` receiver, and non-fallible (`Bare`/`Ctx`-kind)
/// targets, are wrapped in a small closure instead: Rust has no reflection
/// to recover a stable name from an arbitrary self-taking method value, and
/// non-fallible targets can never be passed to `Deps` in the first place
/// (the blanket `IntoBoundFn` impls require `Result<(),
/// stave_runtime::FatalError>`), so there is no cross-reference to keep
/// consistent with (see DESIGN.md).
fn dispatch_fn(target: &Target, modules: &[UserModule]) -> Result<TokenStream, StaveError> {
    let module_ident = modules
        .iter()
        .find(|m| m.path == target.span.file)
        .map(|m| format_ident!("{}", m.ident))
        .ok_or_else(|| StaveError::Config(format!(
            "internal error: no module declared for {}",
            target.span.file.display()
        )))?;

    let ident = dispatch_ident(target);
    let arity = target.sig.arity();
    let fq = target.fq_name();

    let mut arg_parsers = Vec::new();
    let mut arg_idents = Vec::new();
    for (idx, arg) in target.sig.args.iter().enumerate() {
        let name = format_ident!("a{idx}");
        let token_expr = quote! { &rest[#idx] };
        let parsed = parse_expr(*arg, token_expr);
        arg_parsers.push(quote! { let #name = #parsed; });
        arg_idents.push(name);
    }

    let variadic_consume = target.sig.variadic.map(|elem| {
        let elem_ty = rust_type_tokens(elem);
        let parse = parse_expr(elem, quote! { tok });
        quote! {
            let known = known_tokens();
            let mut variadic: Vec<#elem_ty> = Vec::new();
            let mut idx = #arity;
            while idx < rest.len() && !known.contains(rest[idx].to_ascii_lowercase().as_str()) {
                let tok = &rest[idx];
                variadic.push(#parse);
                idx += 1;
            }
            let consumed = idx;
        }
    });
    let consumed_expr = if target.sig.variadic.is_some() {
        quote! { consumed }
    } else {
        quote! { #arity }
    };
    if target.sig.variadic.is_some() {
        arg_idents.push(format_ident!("variadic"));
    }

    let args_tuple = quote! { ( #(#arg_idents),* , ) };

    let direct_ok = !target.has_self && target.sig.fallible() && target.sig.is_async;
    let binder = if direct_ok {
        let path = direct_fn_path(target, &module_ident).expect("has_self already excluded");
        if target.sig.kind.takes_ctx() {
            if arity == 0 && target.sig.variadic.is_none() {
                quote! { stave_runtime::bind::bare_ctx(#path) }
            } else {
                quote! { stave_runtime::bind::f_ctx(#path, #args_tuple) }
            }
        } else if arity == 0 && target.sig.variadic.is_none() {
            quote! { stave_runtime::bind::bare(#path) }
        } else {
            quote! { stave_runtime::bind::f(#path, #args_tuple) }
        }
    } else {
        wrapped_binder(target, &module_ident, &arg_idents, &args_tuple)
    };

    Ok(quote! {
        fn #ident(rest: &[String]) -> Result<(stave_runtime::BoundFn, usize), String> {
            if rest.len() < #arity {
                return Err(format!(
                    "target {:?} expects {} argument(s), got {}",
                    #fq, #arity, rest.len()
                ));
            }
            #(#arg_parsers)*
            #variadic_consume
            let bound = #binder;
            Ok((bound, #consumed_expr))
        }
    })
}

/// Build the closure-wrapped binder for a target that can't be passed to
/// `bind::f`/`bind::bare`/`f_ctx`/`bare_ctx` as a bare function item (a
/// `self`-taking namespace method, or a `Bare`/`Ctx`-kind target whose body
/// doesn't return `Result<(), stave_runtime::FatalError>`).
fn wrapped_binder(
    target: &Target,
    module: &proc_macro2::Ident,
    arg_idents: &[proc_macro2::Ident],
    args_tuple: &TokenStream,
) -> TokenStream {
    let call_segments: Vec<&str> = target.call_path.split("::").collect();
    let (receiver_path, method) = call_segments.split_at(call_segments.len() - 1);
    let method_ident = format_ident!("{}", method[0]);

    let call_expr = if target.has_self {
        let receiver_idents = receiver_path.iter().map(|s| format_ident!("{s}"));
        quote! { #module::#(#receiver_idents)::*.#method_ident(#(#arg_idents),*) }
    } else {
        let idents = call_segments.iter().map(|s| format_ident!("{s}"));
        quote! { #module::#(#idents)::*(#(#arg_idents),*) }
    };

    let awaited = if target.sig.is_async {
        quote! { #call_expr.await }
    } else {
        call_expr
    };

    let body = if target.sig.fallible() {
        quote! { #awaited }
    } else {
        quote! { #awaited; Ok(()) }
    };

    let params = arg_idents.iter().map(|i| quote! { #i });
    if target.sig.kind.takes_ctx() {
        let closure = quote! { move |__ctx: tokio_util::sync::CancellationToken, #(#params),*| async move { #body } };
        if arg_idents.is_empty() {
            quote! { stave_runtime::bind::bare_ctx(#closure) }
        } else {
            quote! { stave_runtime::bind::f_ctx(#closure, #args_tuple) }
        }
    } else {
        let closure = quote! { move |#(#params),*| async move { #body } };
        if arg_idents.is_empty() {
            quote! { stave_runtime::bind::bare(#closure) }
        } else {
            quote! { stave_runtime::bind::f(#closure, #args_tuple) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::model::{SourceSpan, TargetSig};
    use std::path::PathBuf;

    fn sample_target() -> (Target, PathBuf) {
        let file = PathBuf::from("/tmp/stave-mainfile-test/build.rs");
        (
            Target {
                name: "Build".to_string(),
                call_path: "Build".to_string(),
                namespace: None,
                has_self: false,
                sig: TargetSig {
                    kind: SigKind::Err,
                    args: vec![ArgType::Bool],
                    variadic: None,
                    is_async: true,
                },
                doc: "Builds the project.".to_string(),
                span: SourceSpan { file: file.clone(), line: 1 },
            },
            file,
        )
    }

    #[test]
    fn generate_renders_parseable_rust_source() {
        let (target, file) = sample_target();
        let mut meta = PackageMetadata::default();
        meta.package_doc = "A sample stavefile.".to_string();
        meta.default = Some(target.fq_name());
        meta.aliases.insert("b".to_string(), target.fq_name());
        meta.targets.push(target);

        let rendered = generate(&meta, &[file]).expect("mainfile generation should succeed");
        assert!(rendered.starts_with("// stave:target-file\n"));
        assert!(rendered.contains("fn main"));
        assert!(rendered.contains("__stave_dispatch_Build"));
        syn::parse_file(&rendered).expect("generated mainfile must be syntactically valid Rust");
    }

    #[test]
    fn module_ident_sanitizes_hyphens_and_leading_digits() {
        assert_eq!(module_ident_string(Path::new("2-build.rs")), "__stave_user__2_build");
        assert_eq!(module_ident_string(Path::new("docker-tasks.rs")), "__stave_user_docker_tasks");
    }

    #[test]
    fn usage_line_lists_args_and_variadic_tail() {
        let (mut target, _) = sample_target();
        target.sig.variadic = Some(ArgType::Str);
        assert_eq!(usage_line(&target), "Build [bool] [string...]");
    }
}
