//! # Error Contexts
//!
//! Structured metadata for errors to enable programmatic handling at the
//! boundary (status mapping, pagination of available names, audit trails).

use serde::{Deserialize, Serialize};

/// Structured context attached to a [`crate::QuarryError`].
///
/// Each variant provides the fields relevant to that error type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for QRY-1001 (QueryNotFound)
    QueryNotFound {
        name: String,
        available_queries: Vec<String>,
    },

    /// Context for QRY-2001 (InvalidParameter)
    InvalidParameter {
        parameter: String,
        declared: Vec<String>,
    },

    /// Context for warehouse errors (QRY-3001..3004)
    Warehouse {
        /// Upstream HTTP status, when the warehouse supplied one
        status: Option<u16>,
        job_id: Option<String>,
    },

    /// Context for QRY-4001 (AuthenticationFailed)
    Auth { provider: String },

    /// Context for QRY-5001 (StorageWriteFailed)
    Storage { path: String },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_not_found_context_serde_roundtrip() {
        let ctx = ErrorContext::QueryNotFound {
            name: "nope".to_string(),
            available_queries: vec!["rum-pageviews".to_string()],
        };

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"type\":\"query_not_found\""));

        let de: ErrorContext = serde_json::from_str(&json).unwrap();
        match de {
            ErrorContext::QueryNotFound { name, .. } => assert_eq!(name, "nope"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_warehouse_context_carries_status() {
        let ctx = ErrorContext::Warehouse {
            status: Some(403),
            job_id: Some("job_abc".to_string()),
        };

        let json = serde_json::to_string(&ctx).unwrap();
        let de: ErrorContext = serde_json::from_str(&json).unwrap();
        match de {
            ErrorContext::Warehouse { status, job_id } => {
                assert_eq!(status, Some(403));
                assert_eq!(job_id.as_deref(), Some("job_abc"));
            }
            _ => panic!("Wrong variant"),
        }
    }
}
