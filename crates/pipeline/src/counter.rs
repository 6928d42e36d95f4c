//! Pagination totals from the secondary count statement.
//!
//! Runs only when a template declares a `# hlx:metadata` block. The statement
//! executes with the same bound parameters as the main query and must return
//! exactly one row carrying a `total_rows` aggregate. Failure policy belongs
//! to the orchestrator (soft-fail: totals are omitted, the primary result
//! stands).

use quarry_common::models::ParamMap;
use quarry_error::{ErrorCode, QuarryError, Result};

use crate::executor::QueryExecutor;

/// The aggregate column the count statement must project.
pub const TOTAL_ROWS_FIELD: &str = "total_rows";

pub async fn total_rows(executor: &QueryExecutor, sql: &str, params: &ParamMap) -> Result<u64> {
    let outcome = executor.run(sql, params).await.map_err(|e| {
        QuarryError::new(
            ErrorCode::MetadataQueryFailed,
            format!("Count statement failed: {}", e.message),
        )
    })?;

    let row = outcome.results.first().ok_or_else(|| {
        QuarryError::new(
            ErrorCode::MetadataQueryFailed,
            "Count statement returned no rows",
        )
    })?;

    let value = row.get(TOTAL_ROWS_FIELD).ok_or_else(|| {
        QuarryError::new(
            ErrorCode::MetadataQueryFailed,
            format!("Count statement did not project '{}'", TOTAL_ROWS_FIELD),
        )
    })?;

    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(|| {
            QuarryError::new(
                ErrorCode::MetadataQueryFailed,
                format!("'{}' is not a non-negative integer: {}", TOTAL_ROWS_FIELD, n),
            )
        }),
        serde_json::Value::String(s) => s.parse().map_err(|_| {
            QuarryError::new(
                ErrorCode::MetadataQueryFailed,
                format!("'{}' is not numeric: {}", TOTAL_ROWS_FIELD, s),
            )
        }),
        other => Err(QuarryError::new(
            ErrorCode::MetadataQueryFailed,
            format!("'{}' has unexpected type: {}", TOTAL_ROWS_FIELD, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use quarry_common::config::WarehouseSettings;
    use quarry_common::models::{ResponseDetails, Row};
    use quarry_connectors::warehouse::{QueryStream, StreamingQuery, Warehouse};
    use serde_json::json;
    use std::sync::Arc;

    struct OneRowWarehouse {
        row: Option<Row>,
    }

    #[async_trait]
    impl Warehouse for OneRowWarehouse {
        async fn run_streaming_query(&self, _query: StreamingQuery) -> Result<QueryStream> {
            let rows: Vec<Result<Row>> = self.row.clone().map(Ok).into_iter().collect();
            Ok(QueryStream {
                rows: futures::stream::iter(rows).boxed(),
                details: ResponseDetails::default(),
                headers: Default::default(),
            })
        }
    }

    fn executor_with(row: Option<Row>) -> QueryExecutor {
        QueryExecutor::new(
            Arc::new(OneRowWarehouse { row }),
            &WarehouseSettings::default(),
        )
    }

    fn count_row(value: serde_json::Value) -> Row {
        let mut row = Row::new();
        row.insert(TOTAL_ROWS_FIELD.to_string(), value);
        row
    }

    #[tokio::test]
    async fn test_extracts_numeric_total() {
        let executor = executor_with(Some(count_row(json!(5))));
        let total = total_rows(&executor, "SELECT count(*)", &ParamMap::new())
            .await
            .unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_extracts_stringly_total() {
        let executor = executor_with(Some(count_row(json!("1234"))));
        let total = total_rows(&executor, "SELECT count(*)", &ParamMap::new())
            .await
            .unwrap();
        assert_eq!(total, 1234);
    }

    #[tokio::test]
    async fn test_missing_column_is_metadata_error() {
        let mut row = Row::new();
        row.insert("count".to_string(), json!(5));
        let executor = executor_with(Some(row));

        let err = total_rows(&executor, "SELECT count(*)", &ParamMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MetadataQueryFailed);
    }

    #[tokio::test]
    async fn test_empty_result_is_metadata_error() {
        let executor = executor_with(None);
        let err = total_rows(&executor, "SELECT count(*)", &ParamMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MetadataQueryFailed);
    }
}
