//! Namespace marker trait (spec.md §3/§4.B: "methods on a type declared as
//! `type X Namespace`").
//!
//! Go's Mage recognizes a namespace by its underlying type (`type Docker
//! mg.Namespace`). Rust has no type aliases that carry trait obligations for
//! free, so the equivalent here is a zero-sized unit struct that opts in by
//! implementing this marker trait:
//!
//! ```ignore
//! pub struct Docker;
//! impl stave_runtime::Namespace for Docker {}
//!
//! impl Docker {
//!     /// Builds the docker image.
//!     pub fn build() { /* ... */ }
//! }
//! ```
//!
//! The [Package Parser](../../stave/src/parse) looks for `impl Namespace for
//! X {}` blocks to decide which `impl X { .. }` method blocks contribute
//! namespaced targets (`Docker:build`); this trait itself has no runtime
//! behavior; it only marks the type at compile time and parse time.
pub trait Namespace {}
