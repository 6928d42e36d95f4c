use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A single result row: ordered field name to scalar/array value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A typed query parameter value.
///
/// Caller input always arrives as strings; the binder coerces each value once,
/// at bind time, so the warehouse parameter binder receives correctly typed
/// values. Coercion rules: `"true"`/`"false"` literals become `Bool`, integer
/// strings become `Int`, decimal strings become `Float`, everything else stays
/// `Str`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The warehouse wire type for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "BOOL",
            ParamValue::Int(_) => "INT64",
            ParamValue::Float(_) => "FLOAT64",
            ParamValue::Str(_) => "STRING",
        }
    }

    /// The value rendered for the warehouse request body.
    pub fn render(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(n) => n.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Str(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// An ordered, fully typed parameter map.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Warehouse execution metadata from the query response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    /// Row count the warehouse declared for the full stream, independent of
    /// how many rows were accumulated before truncation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

/// The unit returned to the boundary for a named query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    /// Ordered result rows
    pub results: Vec<Row>,
    /// True when row accumulation stopped at the memory budget rather than
    /// stream exhaustion
    pub truncated: bool,
    /// Warehouse-supplied extra response headers (rate-limit, cache hints)
    pub headers: HashMap<String, String>,
    /// Declared parameter metadata, echoed for self-documentation
    pub description: serde_json::Value,
    /// The bound parameter set with secrets removed, echoed for auditability
    pub request_params: ParamMap,
    /// Warehouse execution metadata
    pub response_details: ResponseDetails,
    /// Pagination total from the metadata/count query, when one is declared
    /// and succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}
