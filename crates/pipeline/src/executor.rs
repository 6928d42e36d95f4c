//! Streaming query execution with bounded accumulation.
//!
//! Rows are appended as they arrive from the warehouse. After the 10th row
//! the average serialized row size is sampled once; from then on the stream is
//! stopped early as soon as the estimate says one more row would push the
//! response past the memory budget. The estimate trades exactness for a
//! single sampling pass; the budget tracks the response size limit of the
//! boundary transport.

use std::sync::Arc;

use futures::StreamExt;

use quarry_common::config::WarehouseSettings;
use quarry_common::models::{ParamMap, ResponseDetails, Row};
use quarry_connectors::warehouse::{StreamingQuery, Warehouse};
use quarry_error::Result;

/// Accumulation budget in serialized bytes (0.9 MiB).
pub const RESULT_SIZE_BUDGET: usize = 943_718;

/// Rows accumulated before the average row size is sampled.
const SIZE_SAMPLE_ROWS: usize = 10;

/// What one execution produced.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub results: Vec<Row>,
    /// True when accumulation stopped at the budget rather than stream end
    pub truncated: bool,
    pub headers: std::collections::HashMap<String, String>,
    pub details: ResponseDetails,
}

/// Issues bound-parameter queries against the warehouse and applies the
/// accumulation policy. Stateless across invocations.
pub struct QueryExecutor {
    warehouse: Arc<dyn Warehouse>,
    project: String,
    dataset: String,
    max_results: u64,
}

impl QueryExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, settings: &WarehouseSettings) -> Self {
        Self {
            warehouse,
            project: settings.project.clone(),
            dataset: settings.dataset.clone(),
            max_results: settings.max_results,
        }
    }

    pub async fn run(&self, sql: &str, params: &ParamMap) -> Result<ExecutionOutcome> {
        let stream = self
            .warehouse
            .run_streaming_query(StreamingQuery {
                project: self.project.clone(),
                dataset: self.dataset.clone(),
                sql: sql.to_string(),
                max_results: self.max_results,
                params: params.clone(),
            })
            .await?;

        let mut rows = stream.rows;
        let mut results: Vec<Row> = Vec::new();
        let mut truncated = false;
        let mut avg_row_size: Option<usize> = None;

        while let Some(row) = rows.next().await {
            let row = row?;

            if let Some(avg) = avg_row_size {
                if avg * (results.len() + 1) > RESULT_SIZE_BUDGET {
                    truncated = true;
                    break;
                }
            }

            results.push(row);

            if results.len() == SIZE_SAMPLE_ROWS && avg_row_size.is_none() {
                avg_row_size = Some(sample_average_size(&results)?);
            }
        }

        // Dropping the stream abandons any remaining pages
        drop(rows);

        tracing::debug!(
            rows = results.len(),
            truncated,
            avg_row_size = avg_row_size.unwrap_or(0),
            "query stream drained"
        );

        Ok(ExecutionOutcome {
            results,
            truncated,
            headers: stream.headers,
            details: stream.details,
        })
    }
}

fn sample_average_size(rows: &[Row]) -> Result<usize> {
    let mut total = 0usize;
    for row in rows {
        total += serde_json::to_vec(row)?.len();
    }
    Ok(total / rows.len().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use quarry_connectors::warehouse::QueryStream;
    use serde_json::json;

    struct StubWarehouse {
        rows: Vec<Row>,
    }

    #[async_trait]
    impl Warehouse for StubWarehouse {
        async fn run_streaming_query(&self, _query: StreamingQuery) -> Result<QueryStream> {
            let rows = self.rows.clone();
            Ok(QueryStream {
                rows: stream::iter(rows.into_iter().map(Ok)).boxed(),
                details: ResponseDetails {
                    job_id: Some("stub_job".to_string()),
                    total_rows: Some(self.rows.len() as u64),
                    ..Default::default()
                },
                headers: std::collections::HashMap::new(),
            })
        }
    }

    fn executor_for(rows: Vec<Row>) -> QueryExecutor {
        QueryExecutor::new(
            Arc::new(StubWarehouse { rows }),
            &WarehouseSettings::default(),
        )
    }

    fn row_of_size(bytes: usize) -> Row {
        let mut row = Row::new();
        row.insert("payload".to_string(), json!("x".repeat(bytes)));
        row
    }

    #[tokio::test]
    async fn test_small_stream_is_not_truncated() {
        let rows: Vec<Row> = (0..5).map(|_| row_of_size(100)).collect();
        let outcome = executor_for(rows)
            .run("SELECT 1", &ParamMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 5);
        assert!(!outcome.truncated);
        assert_eq!(outcome.details.job_id.as_deref(), Some("stub_job"));
    }

    #[tokio::test]
    async fn test_large_stream_truncates_at_budget() {
        // ~10 KiB per row crosses the 0.9 MiB budget near row 94
        let rows: Vec<Row> = (0..200).map(|_| row_of_size(10_000)).collect();
        let outcome = executor_for(rows)
            .run("SELECT 1", &ParamMap::new())
            .await
            .unwrap();

        assert!(outcome.truncated);
        assert!(outcome.results.len() > SIZE_SAMPLE_ROWS);
        assert!(outcome.results.len() < 200);
    }

    #[tokio::test]
    async fn test_stream_under_budget_drains_completely() {
        // 50 rows x ~1 KiB stays well under the budget
        let rows: Vec<Row> = (0..50).map(|_| row_of_size(1_000)).collect();
        let outcome = executor_for(rows)
            .run("SELECT 1", &ParamMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 50);
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_oversized_short_stream_is_never_truncated() {
        // Sampling happens after the 10th row; fewer rows than that are
        // returned whole even when their total size exceeds the budget.
        let rows: Vec<Row> = (0..5).map(|_| row_of_size(300_000)).collect();
        let outcome = executor_for(rows)
            .run("SELECT 1", &ParamMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 5);
        assert!(!outcome.truncated);
    }
}
