//! Argument coercion (spec.md §4.D, §9 "Reflection for argument coercion").
//!
//! The Target grammar's closed primitive set is small enough to encode as a
//! tagged enum. The generated dispatcher (built by the Mainfile Generator in
//! the `stave` crate) matches argv tokens against a target's [`ArgType`]
//! list and calls the matching `parse_*` function here, rather than each
//! stavefile reimplementing its own coercion rules.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The closed set of primitive types a target argument may have, plus an
/// optional variadic tail of one of these (spec.md §3 Target invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Int,
    Float,
    Bool,
    Duration,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgType::Str => "string",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
            ArgType::Duration => "duration",
        };
        f.write_str(s)
    }
}

/// Coercing an argv token to a target's declared [`ArgType`] failed.
/// Surfaced to the outer process as a `UsageError` (spec.md §7), exit code 2.
#[derive(Debug, Error)]
#[error("cannot parse {value:?} as {expected}")]
pub struct CoerceError {
    pub value: String,
    pub expected: ArgType,
}

/// Parse a string argument: always succeeds, the value is taken verbatim.
pub fn parse_str(value: &str) -> String {
    value.to_string()
}

/// Parse an integer argument.
pub fn parse_int(value: &str) -> Result<i64, CoerceError> {
    value.parse().map_err(|_| CoerceError {
        value: value.to_string(),
        expected: ArgType::Int,
    })
}

/// Parse a floating-point argument.
pub fn parse_float(value: &str) -> Result<f64, CoerceError> {
    value.parse().map_err(|_| CoerceError {
        value: value.to_string(),
        expected: ArgType::Float,
    })
}

/// Parse a boolean argument. Accepts `1/0/true/false/yes/no`
/// case-insensitively (spec.md §4.D).
pub fn parse_bool(value: &str) -> Result<bool, CoerceError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(CoerceError {
            value: value.to_string(),
            expected: ArgType::Bool,
        }),
    }
}

/// Parse a duration argument via the scalar+unit grammar (`1h30m`, `500ms`,
/// …), delegating to `humantime` (the teacher's own dependency of choice for
/// human-readable duration parsing).
pub fn parse_duration(value: &str) -> Result<Duration, CoerceError> {
    humantime::parse_duration(value).map_err(|_| CoerceError {
        value: value.to_string(),
        expected: ArgType::Duration,
    })
}

/// Render a value of each primitive type back to the string form
/// [`parse_bool`]/[`parse_duration`]/etc. accept, for the round-trip
/// property spec.md §8 invariant 5 requires (`format(parse(s)) ==
/// normalize(s)`; `parse(format(v)) == v`).
pub mod format {
    use std::time::Duration;

    pub fn bool_(value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    pub fn duration(value: Duration) -> String {
        humantime::format_duration(value).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("1", true; "digit one")]
    #[test_case("TRUE", true; "case insensitive true")]
    #[test_case("Yes", true; "case insensitive yes")]
    #[test_case("0", false; "digit zero")]
    #[test_case("FALSE", false; "case insensitive false")]
    #[test_case("No", false; "case insensitive no")]
    fn parse_bool_accepts_documented_spellings(input: &str, expected: bool) {
        assert_eq!(parse_bool(input).unwrap(), expected);
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn parse_int_round_trips() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-7").unwrap(), -7);
        assert!(parse_int("abc").is_err());
    }

    #[test]
    fn parse_duration_accepts_scalar_unit_grammar() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert!(parse_duration("nonsense").is_err());
    }

    #[test]
    fn format_then_parse_round_trips_bool() {
        for value in [true, false] {
            assert_eq!(parse_bool(format::bool_(value)).unwrap(), value);
        }
    }

    #[test]
    fn format_then_parse_round_trips_duration() {
        let value = Duration::from_secs(90);
        let formatted = format::duration(value);
        assert_eq!(parse_duration(&formatted).unwrap(), value);
    }
}
