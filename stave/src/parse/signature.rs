//! Translates a `syn::Signature` into a [`TargetSig`], enforcing the Target
//! grammar (spec.md §3): argument types restricted to the primitive set
//! (plus a variadic tail), return arity ≤ 1 of type `error` only.

use syn::{FnArg, GenericArgument, PathArguments, ReturnType, Type};

use super::model::{ArgType, SigKind, TargetSig};

/// Parse `sig` into a [`TargetSig`], or `Err(message)` describing why it
/// doesn't fit the Target grammar (surfaced as a `ParseError`, spec.md §7).
pub fn signature_to_targetsig(sig: &syn::Signature) -> Result<TargetSig, String> {
    let mut inputs = sig.inputs.iter();

    // Receivers (`self`/`&self`) are consumed transparently: namespace
    // methods may declare one since the marker type is constructible as a
    // unit-struct value, but it carries no argument identity of its own.
    // Rust requires `self` to be the first parameter when present, so it's
    // stripped before looking for a leading context parameter.
    if matches!(inputs.clone().next(), Some(FnArg::Receiver(_))) {
        inputs.next();
    }

    let mut takes_ctx = false;
    if let Some(FnArg::Typed(pat)) = inputs.clone().next() {
        if is_cancellation_token(&pat.ty) {
            takes_ctx = true;
            inputs.next();
        }
    }

    let params: Vec<&FnArg> = inputs.collect();
    let mut args = Vec::new();
    let mut variadic = None;

    for (idx, param) in params.iter().enumerate() {
        let FnArg::Typed(pat) = param else {
            return Err("target arguments must not be additional `self` receivers".to_string());
        };
        let is_last = idx + 1 == params.len();
        if is_last {
            if let Some(elem) = variadic_elem_type(&pat.ty) {
                let Some(arg_type) = classify_primitive(elem) else {
                    return Err(format!(
                        "unsupported variadic argument type in target signature: {}",
                        type_to_string(elem)
                    ));
                };
                variadic = Some(arg_type);
                continue;
            }
        }
        let Some(arg_type) = classify_primitive(&pat.ty) else {
            return Err(format!(
                "unsupported argument type in target signature: {}",
                type_to_string(&pat.ty)
            ));
        };
        args.push(arg_type);
    }

    let fallible = match &sig.output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => {
            if !is_fatal_result(ty) {
                return Err(format!(
                    "targets may only return `()` or `Result<(), FatalError>`, found {}",
                    type_to_string(ty)
                ));
            }
            true
        }
    };

    // `stave_runtime::bind` binds arguments through fixed-arity tuple impls
    // (spec.md §9 "Reflection for argument coercion": arg lists are encoded
    // as a closed tagged set, generated per-target in the mainfile rather
    // than carried as reflection data), capped at four slots including a
    // variadic tail.
    if args.len() + variadic.is_some() as usize > 4 {
        return Err(format!(
            "targets support at most 4 arguments (including a variadic tail), found {}",
            args.len() + variadic.is_some() as usize
        ));
    }

    let kind = match (takes_ctx, fallible) {
        (false, false) => SigKind::Bare,
        (false, true) => SigKind::Err,
        (true, false) => SigKind::Ctx,
        (true, true) => SigKind::CtxErr,
    };

    Ok(TargetSig {
        kind,
        args,
        variadic,
        is_async: sig.asyncness.is_some(),
    })
}

fn last_segment_ident(ty: &Type) -> Option<&syn::Ident> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|seg| &seg.ident),
        _ => None,
    }
}

fn is_cancellation_token(ty: &Type) -> bool {
    last_segment_ident(ty).is_some_and(|ident| ident == "CancellationToken")
}

/// Whether `ty` is `Result<(), X>` for some error type `X` (the only return
/// arity/type the Target grammar permits besides no return at all).
fn is_fatal_result(ty: &Type) -> bool {
    let Type::Path(p) = ty else { return false };
    let Some(seg) = p.path.segments.last() else { return false };
    if seg.ident != "Result" {
        return false;
    }
    let PathArguments::AngleBracketed(generics) = &seg.arguments else {
        return false;
    };
    matches!(
        generics.args.first(),
        Some(GenericArgument::Type(Type::Tuple(t))) if t.elems.is_empty()
    )
}

/// If `ty` is `Vec<T>` or `&[T]`, the element type `T`; used to detect a
/// variadic trailing parameter.
fn variadic_elem_type(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Path(p) => {
            let seg = p.path.segments.last()?;
            if seg.ident != "Vec" {
                return None;
            }
            let PathArguments::AngleBracketed(generics) = &seg.arguments else { return None };
            match generics.args.first()? {
                GenericArgument::Type(t) => Some(t),
                _ => None,
            }
        }
        Type::Reference(r) => match &*r.elem {
            Type::Slice(s) => Some(&s.elem),
            _ => None,
        },
        _ => None,
    }
}

fn classify_primitive(ty: &Type) -> Option<ArgType> {
    match ty {
        Type::Reference(r) => classify_primitive(&r.elem),
        Type::Path(p) => {
            let ident = p.path.segments.last()?.ident.to_string();
            match ident.as_str() {
                "String" | "str" => Some(ArgType::Str),
                "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
                    Some(ArgType::Int)
                }
                "f32" | "f64" => Some(ArgType::Float),
                "bool" => Some(ArgType::Bool),
                "Duration" => Some(ArgType::Duration),
                _ => None,
            }
        }
        _ => None,
    }
}

fn type_to_string(ty: &Type) -> String {
    quote::quote!(#ty).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn bare_no_args() {
        let sig: syn::Signature = parse_quote!(fn build());
        let out = signature_to_targetsig(&sig).unwrap();
        assert_eq!(out.kind, SigKind::Bare);
        assert!(out.args.is_empty());
    }

    #[test]
    fn err_with_primitive_args() {
        let sig: syn::Signature =
            parse_quote!(fn build(release: bool, count: i64) -> Result<(), stave_runtime::FatalError>);
        let out = signature_to_targetsig(&sig).unwrap();
        assert_eq!(out.kind, SigKind::Err);
        assert_eq!(out.args, vec![ArgType::Bool, ArgType::Int]);
    }

    #[test]
    fn ctx_signature_strips_leading_token_param() {
        let sig: syn::Signature =
            parse_quote!(fn watch_build(ctx: tokio_util::sync::CancellationToken, name: String));
        let out = signature_to_targetsig(&sig).unwrap();
        assert_eq!(out.kind, SigKind::Ctx);
        assert_eq!(out.args, vec![ArgType::Str]);
    }

    #[test]
    fn ctx_err_signature() {
        let sig: syn::Signature = parse_quote!(
            fn deploy(ctx: CancellationToken, env: String) -> Result<(), stave_runtime::FatalError>
        );
        let out = signature_to_targetsig(&sig).unwrap();
        assert_eq!(out.kind, SigKind::CtxErr);
    }

    #[test]
    fn variadic_tail_of_primitives() {
        let sig: syn::Signature = parse_quote!(fn tag(names: Vec<String>));
        let out = signature_to_targetsig(&sig).unwrap();
        assert!(out.args.is_empty());
        assert_eq!(out.variadic, Some(ArgType::Str));
    }

    #[test]
    fn rejects_unsupported_argument_type() {
        let sig: syn::Signature = parse_quote!(fn build(opts: std::collections::HashMap<String, String>));
        assert!(signature_to_targetsig(&sig).is_err());
    }

    #[test]
    fn rejects_unsupported_return_type() {
        let sig: syn::Signature = parse_quote!(fn build() -> i32);
        assert!(signature_to_targetsig(&sig).is_err());
    }

    #[test]
    fn method_with_self_receiver_is_supported() {
        let sig: syn::Signature = parse_quote!(fn build(&self, release: bool));
        let out = signature_to_targetsig(&sig).unwrap();
        assert_eq!(out.kind, SigKind::Bare);
        assert_eq!(out.args, vec![ArgType::Bool]);
    }
}
