//! Environment interpolation for configuration values
//!
//! Replaces `${VAR}` placeholders in provider settings and constants, so
//! credentials can live in the environment (or a `.env` file) rather than in
//! the configuration itself.

use crate::error::{InterpolationError, InterpolationResult};
use regex::{Captures, Regex};
use serde_json::Value;
use std::env;
use std::sync::OnceLock;

/// Passes after which a still-changing value is considered recursive
const MAX_PASSES: usize = 16;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder regex is valid"))
}

/// Look a variable up in the process environment
pub fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Interpolate variables in a string
///
/// Unknown variables are left as-is. Values that themselves contain
/// placeholders are expanded again.
pub fn interpolate<F>(s: &str, lookup: F) -> InterpolationResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = placeholder();
    let mut result = s.to_string();

    for _ in 0..MAX_PASSES {
        let mut changed = false;
        let next = re
            .replace_all(&result, |caps: &Captures| match lookup(&caps[1]) {
                Some(value) if !caps[1].is_empty() => {
                    changed = true;
                    value
                }
                _ => caps[0].to_string(),
            })
            .into_owned();

        if !changed {
            return Ok(next);
        }
        result = next;
    }

    Err(InterpolationError::RecursiveInterpolation)
}

/// Interpolate with strict mode - errors on undefined variables
pub fn interpolate_strict<F>(s: &str, lookup: F) -> InterpolationResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(start) = s.find("${") {
        if !s[start..].contains('}') {
            return Err(InterpolationError::InvalidSyntax(s.to_string()));
        }
    }

    let result = interpolate(s, lookup)?;

    if let Some(caps) = placeholder().captures(&result) {
        let var_name = &caps[1];
        if var_name.trim().is_empty() {
            return Err(InterpolationError::InvalidSyntax(caps[0].to_string()));
        }
        return Err(InterpolationError::UndefinedVariable(var_name.to_string()));
    }

    Ok(result)
}

/// Strictly interpolate every string inside a JSON value, in place
pub fn interpolate_value<F>(value: &mut Value, lookup: &F) -> InterpolationResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            *s = interpolate_strict(s, lookup)?;
        }
        Value::Array(items) => {
            for item in items {
                interpolate_value(item, lookup)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item, lookup)?;
            }
        }
        _ => {}
    }
    Ok(())
}
