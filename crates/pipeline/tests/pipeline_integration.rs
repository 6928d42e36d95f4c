use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use quarry_common::config::{ArchiveSettings, CatalogSettings, WarehouseSettings};
use quarry_common::models::{ParamValue, ResponseDetails, Row};
use quarry_connectors::storage::{LocalObjectStore, ObjectStore};
use quarry_connectors::warehouse::{QueryStream, StreamingQuery, Warehouse};
use quarry_error::{ErrorCode, QuarryError, Result};
use quarry_pipeline::{CallerContext, PipelineOptions, QueryPipeline};

const RUM_PAGEVIEWS: &str = "\
--- url: -
--- limit: 100
--- offset: 0
SELECT url, pageviews FROM pageviews
WHERE url = @url
LIMIT @limit

# hlx:metadata
SELECT count(*) AS total_rows FROM pageviews
WHERE url = @url
";

/// Serves canned rows for the main statement and a canned total for the
/// count statement (recognized by its `total_rows` projection).
struct StubWarehouse {
    rows: Vec<Row>,
    total: u64,
    fail_count_statement: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<StreamingQuery>>,
}

impl StubWarehouse {
    fn new(rows: Vec<Row>, total: u64) -> Self {
        Self {
            rows,
            total,
            fail_count_statement: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn pageviews(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("url".to_string(), json!(format!("page-{}.example.com", i)));
                row.insert("pageviews".to_string(), json!(100 + i as i64));
                row
            })
            .collect()
    }
}

#[async_trait]
impl Warehouse for StubWarehouse {
    async fn run_streaming_query(&self, query: StreamingQuery) -> Result<QueryStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_count = query.sql.contains("total_rows");
        self.requests.lock().unwrap().push(query);

        if is_count {
            if self.fail_count_statement {
                return Err(QuarryError::new(
                    ErrorCode::ExecutionFailed,
                    "count statement rejected",
                ));
            }
            let mut row = Row::new();
            row.insert("total_rows".to_string(), json!(self.total));
            return Ok(QueryStream {
                rows: futures::stream::iter(vec![Ok(row)]).boxed(),
                details: ResponseDetails::default(),
                headers: HashMap::new(),
            });
        }

        Ok(QueryStream {
            rows: futures::stream::iter(self.rows.clone().into_iter().map(Ok)).boxed(),
            details: ResponseDetails {
                job_id: Some("job_stub".to_string()),
                total_bytes_processed: Some(2048),
                cache_hit: Some(false),
                total_rows: Some(self.rows.len() as u64),
            },
            headers: HashMap::from([("cache-control".to_string(), "no-store".to_string())]),
        })
    }
}

struct Fixture {
    pipeline: QueryPipeline,
    warehouse: Arc<StubWarehouse>,
    _catalog_dir: tempfile::TempDir,
}

fn fixture_with(warehouse: StubWarehouse, archive: ArchiveSettings) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rum-pageviews.sql"), RUM_PAGEVIEWS).unwrap();
    std::fs::write(
        dir.path().join("rum-sources.sql"),
        "--- limit: 10\nSELECT source FROM sources LIMIT @limit\n",
    )
    .unwrap();

    let warehouse = Arc::new(warehouse);
    let archive_store: Option<Arc<dyn ObjectStore>> = if archive.enabled {
        Some(Arc::new(LocalObjectStore::new(dir.path().join("archive"))))
    } else {
        None
    };

    let pipeline = QueryPipeline::new(PipelineOptions {
        catalog: CatalogSettings {
            directory: dir.path().to_string_lossy().into_owned(),
        },
        warehouse: WarehouseSettings {
            project: "analytics".to_string(),
            dataset: "rum".to_string(),
            ..Default::default()
        },
        archive,
        warehouse_client: warehouse.clone(),
        archive_store,
    });

    Fixture {
        pipeline,
        warehouse,
        _catalog_dir: dir,
    }
}

fn fixture(warehouse: StubWarehouse) -> Fixture {
    fixture_with(warehouse, ArchiveSettings::default())
}

fn url_param() -> HashMap<String, String> {
    HashMap::from([("url".to_string(), "example.com".to_string())])
}

#[tokio::test]
async fn test_end_to_end_named_query() {
    let f = fixture(StubWarehouse::new(StubWarehouse::pageviews(5), 5));

    let envelope = f
        .pipeline
        .execute_named_query("rum-pageviews", &url_param(), &CallerContext::default())
        .await
        .unwrap();

    assert_eq!(envelope.results.len(), 5);
    assert!(!envelope.truncated);
    assert_eq!(envelope.total_rows, Some(5));
    assert_eq!(envelope.response_details.job_id.as_deref(), Some("job_stub"));
    assert_eq!(
        envelope.headers.get("cache-control").map(|s| s.as_str()),
        Some("no-store")
    );

    // Caller value bound, defaults filled, everything typed
    assert_eq!(
        envelope.request_params.get("url"),
        Some(&ParamValue::Str("example.com".to_string()))
    );
    assert_eq!(envelope.request_params.get("limit"), Some(&ParamValue::Int(100)));
    assert_eq!(envelope.request_params.get("offset"), Some(&ParamValue::Int(0)));

    // Declared metadata echoed for self-documentation
    assert_eq!(envelope.description["limit"], json!("100"));

    // Both statements went to the warehouse with the same bound parameters
    let requests = f.warehouse.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.params.get("url") == Some(&ParamValue::Str("example.com".to_string()))));
    assert!(requests
        .iter()
        .all(|r| r.sql.find("@url").is_some() && !r.sql.contains("example.com")));
}

#[tokio::test]
async fn test_unknown_query_name_skips_warehouse() {
    let f = fixture(StubWarehouse::new(vec![], 0));

    let err = f
        .pipeline
        .execute_named_query("nope", &url_param(), &CallerContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::QueryNotFound);
    assert_eq!(f.warehouse.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_parameter_skips_warehouse() {
    let f = fixture(StubWarehouse::new(vec![], 0));

    // rum-pageviews declares url with the "-" placeholder default, so bind
    // succeeds; force a failure through a template with an empty default.
    let dir = f._catalog_dir.path();
    std::fs::write(
        dir.join("strict.sql"),
        "--- url:\nSELECT 1 FROM pageviews WHERE url = @url\n",
    )
    .unwrap();

    let err = f
        .pipeline
        .execute_named_query("strict", &HashMap::new(), &CallerContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidParameter);
    assert_eq!(f.warehouse.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_count_failure_soft_fails_to_omitted_total() {
    let mut warehouse = StubWarehouse::new(StubWarehouse::pageviews(3), 3);
    warehouse.fail_count_statement = true;
    let f = fixture(warehouse);

    let envelope = f
        .pipeline
        .execute_named_query("rum-pageviews", &url_param(), &CallerContext::default())
        .await
        .unwrap();

    assert_eq!(envelope.results.len(), 3);
    assert_eq!(envelope.total_rows, None);
}

#[tokio::test]
async fn test_template_without_sentinel_runs_single_statement() {
    let f = fixture(StubWarehouse::new(StubWarehouse::pageviews(2), 0));

    let envelope = f
        .pipeline
        .execute_named_query("rum-sources", &HashMap::new(), &CallerContext::default())
        .await
        .unwrap();

    assert_eq!(envelope.total_rows, None);
    assert_eq!(f.warehouse.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_domainkey_bound_for_execution_but_redacted_from_echo() {
    let f = fixture(StubWarehouse::new(StubWarehouse::pageviews(1), 1));

    let caller = CallerContext {
        authorization: Some("Bearer sekrit-key".to_string()),
        identity: None,
    };
    let envelope = f
        .pipeline
        .execute_named_query("rum-pageviews", &url_param(), &caller)
        .await
        .unwrap();

    assert!(!envelope.request_params.contains_key("domainkey"));

    let requests = f.warehouse.requests.lock().unwrap();
    assert!(requests
        .iter()
        .all(|r| r.params.get("domainkey") == Some(&ParamValue::Str("sekrit-key".to_string()))));
}

#[tokio::test]
async fn test_describe_does_not_execute() {
    let f = fixture(StubWarehouse::new(vec![], 0));

    let metadata = f.pipeline.describe_named_query("rum-pageviews").unwrap();
    assert_eq!(metadata.names(), vec!["url", "limit", "offset"]);
    assert_eq!(f.warehouse.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_archival_writes_for_internal_identity_only() {
    let archive = ArchiveSettings {
        enabled: true,
        base_url: String::new(),
        queries: vec!["rum-pageviews".to_string()],
        internal_identities: vec!["reporting-scheduler".to_string()],
    };
    let f = fixture_with(StubWarehouse::new(StubWarehouse::pageviews(1), 1), archive);
    let archive_path = f
        ._catalog_dir
        .path()
        .join("archive/rum-pageviews/latest.json");

    // External caller: no archive
    f.pipeline
        .execute_named_query("rum-pageviews", &url_param(), &CallerContext::default())
        .await
        .unwrap();
    assert!(!archive_path.exists());

    // Recognized internal identity: archived
    let caller = CallerContext {
        authorization: None,
        identity: Some("reporting-scheduler".to_string()),
    };
    f.pipeline
        .execute_named_query("rum-pageviews", &url_param(), &caller)
        .await
        .unwrap();
    assert!(archive_path.exists());

    // The archived envelope is the redacted form
    let archived = std::fs::read_to_string(&archive_path).unwrap();
    assert!(!archived.contains("domainkey"));
}

#[tokio::test]
async fn test_failing_archive_store_never_fails_the_request() {
    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put(&self, path: &str, _content: &[u8], _content_type: &str) -> Result<()> {
            Err(QuarryError::new(
                ErrorCode::StorageWriteFailed,
                format!("refused to write {}", path),
            ))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("rum-pageviews.sql"), RUM_PAGEVIEWS).unwrap();

    let pipeline = QueryPipeline::new(PipelineOptions {
        catalog: CatalogSettings {
            directory: dir.path().to_string_lossy().into_owned(),
        },
        warehouse: WarehouseSettings::default(),
        archive: ArchiveSettings {
            enabled: true,
            base_url: String::new(),
            queries: vec!["rum-pageviews".to_string()],
            internal_identities: vec!["reporting-scheduler".to_string()],
        },
        warehouse_client: Arc::new(StubWarehouse::new(StubWarehouse::pageviews(1), 1)),
        archive_store: Some(Arc::new(FailingStore)),
    });

    let caller = CallerContext {
        authorization: None,
        identity: Some("reporting-scheduler".to_string()),
    };
    let envelope = pipeline
        .execute_named_query("rum-pageviews", &url_param(), &caller)
        .await
        .unwrap();
    assert_eq!(envelope.results.len(), 1);
}
