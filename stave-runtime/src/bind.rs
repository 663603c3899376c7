//! Binds a target function to concrete arguments, producing a [`BoundFn`]
//! the [`evaluator`](crate::evaluator) can run at most once.
//!
//! Go's `mg.F(Build, "release")` leans on runtime reflection to recover a
//! function's name and accept its arguments generically. Rust has no
//! runtime reflection, but `std::any::type_name_of_val` gives us the fully
//! module-qualified name of any function item at compile time for free, and
//! a small by-arity trait impl (the same trick `axum`'s `Handler` and
//! `bevy`'s `System` use) lets target functions keep their natural
//! multi-argument signatures instead of forcing everything into one tuple
//! parameter.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::context::ActiveContext;
use crate::fatal::FatalError;
use crate::identity::FnIdentity;

/// A target bound to concrete arguments, ready to be run by the evaluator.
pub struct BoundFn {
    pub(crate) identity: FnIdentity,
    pub(crate) body: Pin<Box<dyn Future<Output = Result<(), FatalError>> + Send>>,
}

impl BoundFn {
    pub fn identity(&self) -> &FnIdentity {
        &self.identity
    }
}

/// Implemented for every target function whose parameter list is `Args`.
/// Not meant to be implemented by hand; see the by-arity impls below.
pub trait IntoBoundFn<Args> {
    fn into_bound_fn(self, args: Args) -> BoundFn;
}

macro_rules! impl_into_bound_fn {
    ($($arg:ident),*) => {
        impl<Func, Fut, $($arg),*> IntoBoundFn<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) -> Fut,
            Fut: Future<Output = Result<(), FatalError>> + Send + 'static,
            $($arg: Serialize + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_bound_fn(self, args: ($($arg,)*)) -> BoundFn {
                let name = std::any::type_name_of_val(&self);
                let ($($arg,)*) = &args;
                let identity = FnIdentity::new(name, ($($arg,)*));
                let ($($arg,)*) = args;
                let future = (self)($($arg),*);
                BoundFn {
                    identity,
                    body: Box::pin(future),
                }
            }
        }
    };
}

impl_into_bound_fn!();
impl_into_bound_fn!(A1);
impl_into_bound_fn!(A1, A2);
impl_into_bound_fn!(A1, A2, A3);
impl_into_bound_fn!(A1, A2, A3, A4);

/// Bind a target function to its arguments. Mirrors spec's `F(fn, args…)`
/// wrapper; works for any arity up to four thanks to [`IntoBoundFn`].
pub fn f<Func, Args>(func: Func, args: Args) -> BoundFn
where
    Func: IntoBoundFn<Args>,
{
    func.into_bound_fn(args)
}

/// Bind a zero-argument target function. Mirrors spec's "bare function
/// reference" form (`Deps(Baz)` rather than `Deps(F(Baz))`).
pub fn bare<Func, Fut>(func: Func) -> BoundFn
where
    Func: IntoBoundFn<()> + FnOnce() -> Fut,
    Fut: Future<Output = Result<(), FatalError>> + Send + 'static,
{
    func.into_bound_fn(())
}

/// Implemented for every ctx-flavored target function (`Ctx`/`CtxErr`,
/// spec.md §3) whose parameters *after* the leading `CancellationToken` are
/// `Args`. `CancellationToken` doesn't implement `Serialize`, so unlike
/// [`IntoBoundFn`] the token is never part of a `Fn`'s identity or its
/// caller-supplied argument tuple — it's always the ambient context,
/// matching spec.md §4.J's "shell helpers always execute their command
/// under the active context" posture extended to the target body itself.
pub trait IntoBoundFnCtx<Args> {
    fn into_bound_fn_ctx(self, args: Args) -> BoundFn;
}

macro_rules! impl_into_bound_fn_ctx {
    ($($arg:ident),*) => {
        impl<Func, Fut, $($arg),*> IntoBoundFnCtx<($($arg,)*)> for Func
        where
            Func: FnOnce(CancellationToken, $($arg),*) -> Fut,
            Fut: Future<Output = Result<(), FatalError>> + Send + 'static,
            $($arg: Serialize + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_bound_fn_ctx(self, args: ($($arg,)*)) -> BoundFn {
                let name = std::any::type_name_of_val(&self);
                let ($($arg,)*) = &args;
                let identity = FnIdentity::new(name, ($($arg,)*));
                let ($($arg,)*) = args;
                let future = async move {
                    let ctx = ActiveContext::current();
                    (self)(ctx, $($arg),*).await
                };
                BoundFn {
                    identity,
                    body: Box::pin(future),
                }
            }
        }
    };
}

impl_into_bound_fn_ctx!();
impl_into_bound_fn_ctx!(A1);
impl_into_bound_fn_ctx!(A1, A2);
impl_into_bound_fn_ctx!(A1, A2, A3);
impl_into_bound_fn_ctx!(A1, A2, A3, A4);

/// Bind a ctx-flavored target function to its non-context arguments
/// (spec.md §3 `SigKind::Ctx`/`SigKind::CtxErr`). The token passed to
/// `func` is [`ActiveContext::current`] at call time, not a caller-supplied
/// value — see [`IntoBoundFnCtx`].
pub fn f_ctx<Func, Args>(func: Func, args: Args) -> BoundFn
where
    Func: IntoBoundFnCtx<Args>,
{
    func.into_bound_fn_ctx(args)
}

/// Bind a zero-argument ctx-flavored target function.
pub fn bare_ctx<Func, Fut>(func: Func) -> BoundFn
where
    Func: IntoBoundFnCtx<()> + FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), FatalError>> + Send + 'static,
{
    func.into_bound_fn_ctx(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn zero_arg() -> Result<(), FatalError> {
        Ok(())
    }

    async fn one_arg(_release: bool) -> Result<(), FatalError> {
        Ok(())
    }

    async fn two_arg(_name: String, _count: i64) -> Result<(), FatalError> {
        Ok(())
    }

    #[test]
    fn bare_and_f_produce_distinct_identities_for_distinct_args() {
        let a = f(one_arg, (true,));
        let b = f(one_arg, (false,));
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn same_args_produce_equal_identities() {
        let a = f(one_arg, (true,));
        let b = f(one_arg, (true,));
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn bare_function_has_stable_identity() {
        let a = bare(zero_arg);
        let b = bare(zero_arg);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn multi_arg_identity_includes_all_arguments() {
        let a = f(two_arg, ("x".to_string(), 1));
        let b = f(two_arg, ("x".to_string(), 2));
        assert_ne!(a.identity(), b.identity());
    }

    async fn ctx_target(_ctx: CancellationToken, name: String) -> Result<(), FatalError> {
        let _ = name;
        Ok(())
    }

    async fn bare_ctx_target(_ctx: CancellationToken) -> Result<(), FatalError> {
        Ok(())
    }

    #[test]
    fn ctx_binder_identity_excludes_the_token() {
        let a = f_ctx(ctx_target, ("prod".to_string(),));
        let b = f_ctx(ctx_target, ("prod".to_string(),));
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn ctx_binder_identity_still_distinguishes_its_own_args() {
        let a = f_ctx(ctx_target, ("prod".to_string(),));
        let b = f_ctx(ctx_target, ("staging".to_string(),));
        assert_ne!(a.identity(), b.identity());
    }

    #[tokio::test]
    async fn bare_ctx_binder_runs_with_the_ambient_context() {
        let bound = bare_ctx(bare_ctx_target);
        (bound.body).await.unwrap();
    }
}
