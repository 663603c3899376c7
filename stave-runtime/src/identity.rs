//! Identity of a bound target invocation ([`FnIdentity`]).
//!
//! Two invocations of the same target with the same arguments must collapse
//! to the same identity so the [`evaluator`](crate::evaluator) can enforce
//! at-most-once-per-run semantics (spec invariant: every `Fn` identity runs
//! exactly once per outer invocation).

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::Value;

/// Identity of a target bound to concrete arguments.
///
/// Equality (and hashing) is based on the symbolic target name plus the
/// canonical JSON encoding of the argument list, matching the data model's
/// `(symbolic name, canonical-JSON-encoded args)` pair. The JSON value is an
/// array, so argument order is inherent to the encoding and no additional
/// key-sorting step is required.
#[derive(Debug, Clone)]
pub struct FnIdentity {
    name: String,
    args: Value,
    /// Cached string form of `args`, used for the `Hash`/`Eq` impls and for
    /// cycle-chain display so we don't re-serialize on every comparison.
    args_repr: String,
}

impl FnIdentity {
    /// Build an identity from a target's fully-qualified name and its
    /// concrete argument values (anything `Serialize`).
    pub fn new(name: impl Into<String>, args: impl Serialize) -> Self {
        let args = serde_json::to_value(args).expect("target arguments must be JSON-serializable");
        let args_repr = args.to_string();
        Self {
            name: name.into(),
            args,
            args_repr,
        }
    }

    /// The target's fully-qualified symbolic name, e.g. `NS:Build`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical JSON-encoded arguments.
    pub fn args(&self) -> &Value {
        &self.args
    }
}

impl PartialEq for FnIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.args_repr == other.args_repr
    }
}

impl Eq for FnIdentity {}

impl Hash for FnIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.args_repr.hash(state);
    }
}

impl fmt::Display for FnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.as_array().is_some_and(|a| a.is_empty()) {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.args_repr)
        }
    }
}
