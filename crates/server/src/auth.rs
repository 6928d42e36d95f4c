//! Caller-context extraction.
//!
//! Quarry does not enforce an authentication policy of its own; the caller's
//! key passes through to the warehouse as the `domainkey` bound parameter.
//! This module only lifts the relevant headers into a [`CallerContext`].

use axum::http::HeaderMap;

use quarry_pipeline::CallerContext;

/// Header carrying the declared system identity of internal callers; gates
/// result archival, nothing else.
pub const REQUESTER_HEADER: &str = "x-quarry-requester";

pub fn caller_context(headers: &HeaderMap) -> CallerContext {
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let identity = headers
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    CallerContext {
        authorization,
        identity,
    }
}
