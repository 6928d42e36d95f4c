//! The warehouse seam: streaming, bound-parameter query execution.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use quarry_common::models::{ParamMap, ResponseDetails, Row};
use quarry_error::Result;

pub mod rest;

pub use rest::RestWarehouse;

/// A single query submission with its out-of-band parameter map.
#[derive(Debug, Clone)]
pub struct StreamingQuery {
    pub project: String,
    pub dataset: String,
    pub sql: String,
    /// Warehouse-side result cap per page/query
    pub max_results: u64,
    /// Named bound parameters; never interpolated into `sql`
    pub params: ParamMap,
}

/// The warehouse's answer: a lazy row stream plus up-front metadata.
pub struct QueryStream {
    /// Rows yielded incrementally; dropping the stream abandons any
    /// remaining pages (best-effort cancellation)
    pub rows: BoxStream<'static, Result<Row>>,
    /// Execution metadata from the first response (job id, bytes, cache hit)
    pub details: ResponseDetails,
    /// Extra response headers worth relaying (rate-limit, cache hints)
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("rows", &"<stream>")
            .field("details", &self.details)
            .field("headers", &self.headers)
            .finish()
    }
}

/// A columnar analytics warehouse, treated as a black box that accepts
/// bound-parameter SQL and streams rows back.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn run_streaming_query(&self, query: StreamingQuery) -> Result<QueryStream>;
}
