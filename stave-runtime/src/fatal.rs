//! `Fatal`/`Fatalf`: let target bodies abort the whole run with a specific
//! process exit code, without every caller having to thread a `Result` all
//! the way up to `main`.
//!
//! Modeled as a typed panic payload (spec.md §9: "implementations may model
//! this as a sentinel error type that the outermost runner recognizes,
//! rather than exceptions") rather than `std::process::exit`, so that
//! sibling dependants still get a chance to finish or observe cancellation
//! before the process actually exits (see [`crate::evaluator`]).

use std::fmt;

/// A request to exit the process with a specific code, raised from inside a
/// target body.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FatalError {
    pub code: i32,
    pub message: String,
}

impl FatalError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Abort the current target with the given exit code and message.
///
/// Raises a typed panic that the evaluator's guard (see
/// [`crate::evaluator::Evaluator`]) recognizes and re-raises verbatim to
/// every waiter, rather than converting it into an "unknown panic"
/// `FatalError(1)`.
#[track_caller]
pub fn fatal(code: i32, message: impl fmt::Display) -> ! {
    std::panic::panic_any(FatalError::new(code, message.to_string()))
}

/// Formatting sibling of [`fatal`], for `fatalf!(code, "...", args)`-style
/// call sites.
#[track_caller]
pub fn fatalf(code: i32, args: fmt::Arguments<'_>) -> ! {
    fatal(code, args)
}

/// Downcast a caught panic payload to a [`FatalError`], falling back to the
/// generic "unknown panic" class (spec.md §7) with exit code 1.
pub fn classify_panic(payload: Box<dyn std::any::Any + Send>) -> FatalError {
    match payload.downcast::<FatalError>() {
        Ok(fatal) => *fatal,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "target panicked with a non-string payload".to_string()
            };
            FatalError::new(1, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_panic_recovers_fatal_error() {
        let result = std::panic::catch_unwind(|| fatal(42, "boom"));
        let payload = result.unwrap_err();
        let fatal = classify_panic(payload);
        assert_eq!(fatal.code, 42);
        assert_eq!(fatal.message, "boom");
    }

    #[test]
    fn classify_panic_falls_back_to_code_one() {
        let result = std::panic::catch_unwind(|| panic!("plain panic"));
        let payload = result.unwrap_err();
        let fatal = classify_panic(payload);
        assert_eq!(fatal.code, 1);
    }
}
