use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following QRY-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Catalog errors (template resolution and loading)
/// - **2000-2999**: Parameter errors
/// - **3000-3999**: Warehouse errors
/// - **4000-4999**: Authentication errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Catalog Errors (1000-1999) ===
    /// QRY-1001: No template with the requested name
    QueryNotFound = 1001,
    /// QRY-1002: Template file exists but could not be read
    TemplateUnreadable = 1002,

    // === Parameter Errors (2000-2999) ===
    /// QRY-2001: A declared parameter has no value and no default
    InvalidParameter = 2001,

    // === Warehouse Errors (3000-3999) ===
    /// QRY-3001: Query rejected or failed mid-stream
    ExecutionFailed = 3001,
    /// QRY-3002: Warehouse response could not be decoded
    ResponseDecode = 3002,
    /// QRY-3003: Secondary metadata statement failed
    MetadataQueryFailed = 3003,
    /// QRY-3004: Network connection timeout
    ConnectionTimeout = 3004,

    // === Auth Errors (4000-4999) ===
    /// QRY-4001: Credential acquisition failed
    AuthenticationFailed = 4001,

    // === Internal Errors (5000-5999) ===
    /// QRY-5001: Archival write failed (always recovered locally)
    StorageWriteFailed = 5001,
    /// QRY-5002: Serialization/deserialization failed
    SerializationFailed = 5002,
    /// QRY-5003: Configuration invalid
    InvalidConfig = 5003,

    /// QRY-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "QRY-1001")
    pub fn as_str(&self) -> String {
        format!("QRY-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Catalog,
            2000..=2999 => ErrorCategory::Parameter,
            3000..=3999 => ErrorCategory::Warehouse,
            4000..=4999 => ErrorCategory::Auth,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        // Parse "QRY-XXXX" format
        let num: u16 = s
            .strip_prefix("QRY-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::QueryNotFound),
            1002 => Ok(Self::TemplateUnreadable),
            2001 => Ok(Self::InvalidParameter),
            3001 => Ok(Self::ExecutionFailed),
            3002 => Ok(Self::ResponseDecode),
            3003 => Ok(Self::MetadataQueryFailed),
            3004 => Ok(Self::ConnectionTimeout),
            4001 => Ok(Self::AuthenticationFailed),
            5001 => Ok(Self::StorageWriteFailed),
            5002 => Ok(Self::SerializationFailed),
            5003 => Ok(Self::InvalidConfig),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category for status mapping and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Catalog,
    Parameter,
    Warehouse,
    Auth,
    Internal,
}
