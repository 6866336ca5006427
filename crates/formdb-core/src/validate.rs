//! Input validation helpers.
//!
//! Field constraints (length, pattern, range) are checked by the input parser
//! as each value is parsed. Rules spanning several fields are supplied by the
//! application as [`RecordValidator`]s and run once all fields are in place.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;

use crate::error::FieldError;
use crate::field::Field;
use crate::record::Record;
use crate::value::Value;

/// A record-level validation rule.
///
/// Implementations push one [`FieldError`] per problem found and must not
/// touch storage.
pub trait RecordValidator: Send + Sync {
    /// Check `record`, appending any problems to `errors`.
    fn validate(&self, record: &Record, errors: &mut Vec<FieldError>);
}

impl<F> RecordValidator for F
where
    F: Fn(&Record, &mut Vec<FieldError>) + Send + Sync,
{
    fn validate(&self, record: &Record, errors: &mut Vec<FieldError>) {
        self(record, errors);
    }
}

/// Compiled field patterns, keyed by source text.
static PATTERNS: LazyLock<RwLock<HashMap<String, Regex>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let cached = PATTERNS
        .read()
        .ok()
        .and_then(|patterns| patterns.get(pattern).cloned());
    if let Some(regex) = cached {
        return Ok(regex);
    }

    let regex = Regex::new(pattern)?;
    if let Ok(mut patterns) = PATTERNS.write() {
        patterns
            .entry(pattern.to_owned())
            .or_insert_with(|| regex.clone());
    }
    Ok(regex)
}

/// Whether `value` matches `pattern`.
///
/// Patterns are compiled once per process. A pattern that does not compile
/// never matches; schemas reject such patterns at build time.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    compiled(pattern).is_ok_and(|regex| regex.is_match(value))
}

/// Compile-check a field pattern, returning the problem if it is invalid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    compiled(pattern)
        .err()
        .map(|e| format!("pattern `{pattern}` does not compile: {e}"))
}

/// Check a parsed, non-null value against the field's constraints.
///
/// Returns the message for the first violated constraint.
pub fn check_constraints(field: &Field, value: &Value) -> Option<String> {
    let c = &field.constraints;
    match value {
        Value::Text(text) => {
            let len = text.chars().count();
            if let Some(min) = c.min_length {
                if len < min {
                    return Some(format!("must be at least {min} characters"));
                }
            }
            if let Some(max) = c.max_length {
                if len > max {
                    return Some(format!("must be at most {max} characters"));
                }
            }
            if let Some(pattern) = &c.pattern {
                if !matches_pattern(text, pattern) {
                    return Some("has an invalid format".to_string());
                }
            }
            None
        }
        Value::Integer(v) => check_range(*v as f64, c.min_value, c.max_value),
        Value::Decimal(v) => check_range(*v, c.min_value, c.max_value),
        _ => None,
    }
}

fn check_range(v: f64, min: Option<f64>, max: Option<f64>) -> Option<String> {
    if let Some(min) = min {
        if v < min {
            return Some(format!("must not be less than {min}"));
        }
    }
    if let Some(max) = max {
        if v > max {
            return Some(format!("must not be more than {max}"));
        }
    }
    None
}
