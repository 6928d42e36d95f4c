//! # quarry-error
//!
//! Unified error types for the Quarry query service.
//!
//! All errors carry:
//! - Numeric error codes (QRY-XXXX), stable across versions
//! - Structured JSON context for programmatic handling
//! - Actionable hints where a likely fix is known

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;
pub use convert::closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all Quarry operations.
///
/// Rendered as JSON at the HTTP boundary; the message is scrubbed of secret
/// material by the boundary layer before it leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarryError {
    /// Numeric error code (e.g., "QRY-1001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Actionable suggestion for the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl QuarryError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add an actionable hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The HTTP status this error renders as.
    ///
    /// Warehouse execution failures reuse the upstream status when the context
    /// carries one; everything else maps by error code.
    pub fn http_status(&self) -> u16 {
        if let Some(ErrorContext::Warehouse {
            status: Some(status),
            ..
        }) = &self.context
        {
            return *status;
        }
        match self.code {
            ErrorCode::QueryNotFound => 404,
            ErrorCode::InvalidParameter => 400,
            ErrorCode::AuthenticationFailed => 401,
            _ => 500,
        }
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize QuarryError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for QuarryError {}

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarry_error_builder() {
        let err = QuarryError::new(ErrorCode::QueryNotFound, "Query not found")
            .with_hint("Check the catalog directory");

        assert_eq!(err.code, ErrorCode::QueryNotFound);
        assert_eq!(err.message, "Query not found");
        assert_eq!(err.hint, Some("Check the catalog directory".to_string()));
        assert!(err.context.is_none());
    }

    #[test]
    fn test_display_implementation() {
        let err = QuarryError::new(ErrorCode::InvalidParameter, "Missing value for 'url'")
            .with_hint("Supply ?url=...");

        assert_eq!(
            err.to_string(),
            "[QRY-2001] Missing value for 'url' (Hint: Supply ?url=...)"
        );

        let err_no_hint = QuarryError::new(ErrorCode::StorageWriteFailed, "PUT rejected");
        assert_eq!(err_no_hint.to_string(), "[QRY-5001] PUT rejected");
    }

    #[test]
    fn test_json_output() {
        let err = QuarryError::new(ErrorCode::ExecutionFailed, "Query rejected");
        let json = err.to_json();

        assert!(json.contains("\"code\":\"QRY-3001\""));
        assert!(json.contains("\"message\":\"Query rejected\""));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            QuarryError::new(ErrorCode::QueryNotFound, "nope").http_status(),
            404
        );
        assert_eq!(
            QuarryError::new(ErrorCode::InvalidParameter, "bad").http_status(),
            400
        );
        assert_eq!(
            QuarryError::new(ErrorCode::AuthenticationFailed, "denied").http_status(),
            401
        );
        assert_eq!(
            QuarryError::new(ErrorCode::ExecutionFailed, "boom").http_status(),
            500
        );
    }

    #[test]
    fn test_http_status_prefers_upstream() {
        let err = QuarryError::new(ErrorCode::ExecutionFailed, "quota exceeded").with_context(
            ErrorContext::Warehouse {
                status: Some(429),
                job_id: None,
            },
        );
        assert_eq!(err.http_status(), 429);
    }
}
