use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use quarry_common::scrubber;
use quarry_error::QuarryError;
use quarry_pipeline::QueryPipeline;

use crate::auth::caller_context;
use crate::{ACTIVE_QUERIES, QUERY_COUNT, REGISTRY};

pub fn create_api_router(pipeline: Arc<QueryPipeline>) -> Router {
    Router::new()
        .route("/query/{name}", get(execute_query))
        .route("/query/{name}/describe", get(describe_query))
        .with_state(pipeline)
}

async fn execute_query(
    State(pipeline): State<Arc<QueryPipeline>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    QUERY_COUNT.inc();
    ACTIVE_QUERIES.inc();

    let caller = caller_context(&headers);
    let result = pipeline.execute_named_query(&name, &params, &caller).await;

    ACTIVE_QUERIES.dec();

    match result {
        Ok(envelope) => {
            let total_rows = envelope.total_rows;
            let relayed = envelope.headers.clone();
            let mut response = Json(&envelope).into_response();

            if let Some(total) = total_rows {
                if let Ok(value) = HeaderValue::from_str(&total.to_string()) {
                    response.headers_mut().insert("x-total-rows", value);
                }
            }
            for (header_name, header_value) in relayed {
                let Ok(header_name) = HeaderName::from_bytes(header_name.as_bytes()) else {
                    continue;
                };
                if let Ok(value) = HeaderValue::from_str(&header_value) {
                    response.headers_mut().insert(header_name, value);
                }
            }
            response
        }
        Err(e) => error_response(e),
    }
}

async fn describe_query(
    State(pipeline): State<Arc<QueryPipeline>>,
    Path(name): Path<String>,
) -> Response {
    match pipeline.describe_named_query(&name) {
        Ok(metadata) => Json(metadata.to_json()).into_response(),
        Err(e) => error_response(e),
    }
}

/// Renders a typed error with its mapped status. The message passes through
/// the scrubber so secret material from upstream never leaves the process.
fn error_response(mut err: QuarryError) -> Response {
    err.message = scrubber::scrub(&err.message);

    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(target: "errors", code = %err.code, message = %err.message, "request failed");
    }

    (status, Json(err)).into_response()
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics_handler() -> impl IntoResponse {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use quarry_common::config::{ArchiveSettings, CatalogSettings, WarehouseSettings};
    use quarry_common::models::{ResponseDetails, Row};
    use quarry_connectors::warehouse::{QueryStream, StreamingQuery, Warehouse};
    use quarry_error::Result;
    use quarry_pipeline::PipelineOptions;
    use tower::ServiceExt;

    struct StubWarehouse;

    #[async_trait]
    impl Warehouse for StubWarehouse {
        async fn run_streaming_query(&self, query: StreamingQuery) -> Result<QueryStream> {
            let mut row = Row::new();
            if query.sql.contains("total_rows") {
                row.insert("total_rows".to_string(), serde_json::json!(7));
            } else {
                row.insert("url".to_string(), serde_json::json!("example.com"));
            }
            Ok(QueryStream {
                rows: futures::stream::iter(vec![Ok(row)]).boxed(),
                details: ResponseDetails::default(),
                headers: HashMap::new(),
            })
        }
    }

    fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rum-pageviews.sql"),
            "--- url: -\n--- limit: 100\nSELECT url FROM pageviews WHERE url = @url\n\n# hlx:metadata\nSELECT count(*) AS total_rows FROM pageviews\n",
        )
        .unwrap();

        let pipeline = Arc::new(QueryPipeline::new(PipelineOptions {
            catalog: CatalogSettings {
                directory: dir.path().to_string_lossy().into_owned(),
            },
            warehouse: WarehouseSettings::default(),
            archive: ArchiveSettings::default(),
            warehouse_client: Arc::new(StubWarehouse),
            archive_store: None,
        }));

        (create_api_router(pipeline), dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_execute_query_returns_envelope_with_total_rows_header() {
        let (router, _dir) = test_router();

        let response = router
            .oneshot(
                axum::http::Request::get("/query/rum-pageviews?url=example.com")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-total-rows").unwrap(),
            &HeaderValue::from_static("7")
        );

        let body = body_json(response).await;
        assert_eq!(body["results"][0]["url"], "example.com");
        assert_eq!(body["truncated"], false);
        assert_eq!(body["totalRows"], 7);
    }

    #[tokio::test]
    async fn test_unknown_query_renders_404_with_code() {
        let (router, _dir) = test_router();

        let response = router
            .oneshot(
                axum::http::Request::get("/query/nope")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "QRY-1001");
    }

    #[tokio::test]
    async fn test_describe_returns_parameter_docs_only() {
        let (router, _dir) = test_router();

        let response = router
            .oneshot(
                axum::http::Request::get("/query/rum-pageviews/describe")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["url"], "-");
        assert_eq!(body["limit"], "100");
    }
}
