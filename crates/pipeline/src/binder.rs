//! Parameter binding.
//!
//! Reconciles the declared parameter set from a template header with
//! caller-supplied values. Values are coerced to their typed form exactly
//! once, here; the templates reference parameters as `@name` placeholders
//! resolved out-of-band by the warehouse, never by string interpolation, so
//! binding is where injection safety rests.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use quarry_common::models::{ParamMap, ParamValue};
use quarry_error::{ErrorCode, ErrorContext, QuarryError, Result};

use crate::catalog::ParameterMetadata;

/// The secret-carrying parameter, always present in the bound set and always
/// absent from the redacted copy.
pub const DOMAINKEY_PARAM: &str = "domainkey";

/// Fallback when neither an Authorization header nor caller input supplies a
/// domainkey.
const FALLBACK_DOMAINKEY: &str = "anonymous";

static INT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static FLOAT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());

/// Pure coercion of a raw caller string to its typed form.
///
/// Rules: `"true"`/`"false"` literals become `Bool`; integer strings become
/// `Int` (falling back to `Str` on i64 overflow); decimal strings become
/// `Float`; everything else stays `Str`. Comma-delimited multi-value strings
/// are deliberately left whole: set-membership semantics belong to the query
/// template, which splits them itself.
pub fn coerce(raw: &str) -> ParamValue {
    match raw {
        "true" => return ParamValue::Bool(true),
        "false" => return ParamValue::Bool(false),
        _ => {}
    }
    if INT_REGEX.is_match(raw) {
        return raw
            .parse::<i64>()
            .map(ParamValue::Int)
            .unwrap_or_else(|_| ParamValue::Str(raw.to_string()));
    }
    if FLOAT_REGEX.is_match(raw) {
        if let Ok(f) = raw.parse::<f64>() {
            return ParamValue::Float(f);
        }
    }
    ParamValue::Str(raw.to_string())
}

/// The fully bound parameter set plus its redacted echo.
#[derive(Debug, Clone)]
pub struct BoundParams {
    /// What the warehouse executes with; includes the domainkey
    pub values: ParamMap,
    /// What is echoed, audited, and archived; the domainkey is removed
    pub redacted: ParamMap,
}

/// Binds caller parameters against the declared set.
///
/// For every declared parameter the caller value wins when present and
/// non-empty, else the declared default applies; a parameter with neither
/// fails the bind. Undeclared caller parameters are dropped. `limit` and
/// `offset` must coerce to integers; they are not clamped here: the
/// warehouse-side result cap is the enforcement point, not this layer.
pub fn bind(
    declared: &ParameterMetadata,
    caller: &HashMap<String, String>,
    authorization: Option<&str>,
) -> Result<BoundParams> {
    let mut values = ParamMap::new();

    for (name, default) in declared.iter() {
        let raw = caller
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or(default);

        if raw.is_empty() {
            return Err(QuarryError::new(
                ErrorCode::InvalidParameter,
                format!("Parameter '{}' has no value and no default", name),
            )
            .with_context(ErrorContext::InvalidParameter {
                parameter: name.to_string(),
                declared: declared.names(),
            }));
        }

        values.insert(name.to_string(), coerce(raw));
    }

    for name in ["limit", "offset"] {
        if let Some(value) = values.get(name) {
            let as_int = match value {
                ParamValue::Int(n) => Some(*n),
                ParamValue::Float(f) => Some(*f as i64),
                _ => None,
            };
            match as_int {
                Some(n) => {
                    values.insert(name.to_string(), ParamValue::Int(n));
                }
                None => {
                    return Err(QuarryError::new(
                        ErrorCode::InvalidParameter,
                        format!("Parameter '{}' must be an integer", name),
                    )
                    .with_context(ErrorContext::InvalidParameter {
                        parameter: name.to_string(),
                        declared: declared.names(),
                    }));
                }
            }
        }
    }

    values.insert(
        DOMAINKEY_PARAM.to_string(),
        ParamValue::Str(resolve_domainkey(declared, caller, authorization)),
    );

    let mut redacted = values.clone();
    redacted.remove(DOMAINKEY_PARAM);

    Ok(BoundParams { values, redacted })
}

/// Authorization header if present, else caller input, else the declared
/// default, else the fallback literal.
fn resolve_domainkey(
    declared: &ParameterMetadata,
    caller: &HashMap<String, String>,
    authorization: Option<&str>,
) -> String {
    if let Some(header) = authorization {
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if !token.is_empty() {
            return token.to_string();
        }
    }
    if let Some(value) = caller.get(DOMAINKEY_PARAM).filter(|v| !v.is_empty()) {
        return value.clone();
    }
    if let Some(default) = declared.get(DOMAINKEY_PARAM).filter(|v| !v.is_empty()) {
        return default.to_string();
    }
    FALLBACK_DOMAINKEY.to_string()
}
