//! Pipeline orchestration.
//!
//! Drives one invocation through its stages:
//!
//! ```text
//! RESOLVE_NAME -> LOAD_TEMPLATE -> PARSE_METADATA -> BIND_PARAMS
//!     -> EXECUTE_COUNT (parallel) EXECUTE_MAIN -> ASSEMBLE_ENVELOPE
//! ```
//!
//! Any stage failure short-circuits with a typed error and no partial
//! envelope. The count statement is logically independent of the main query
//! and runs concurrently with it; its failure is the one soft spot: totals
//! are omitted, the primary result stands. Archival failures are logged and
//! swallowed, never surfaced.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_common::config::{ArchiveSettings, CatalogSettings, WarehouseSettings};
use quarry_common::models::ResultEnvelope;
use quarry_connectors::storage::ObjectStore;
use quarry_connectors::warehouse::Warehouse;
use quarry_error::Result;

use crate::binder::bind;
use crate::catalog::{split_statements, ParameterMetadata, QueryCatalog};
use crate::counter;
use crate::executor::QueryExecutor;

/// Who is asking, as relayed by the boundary layer.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Raw Authorization header value, if the caller sent one
    pub authorization: Option<String>,
    /// Declared system identity (`x-quarry-requester`), used only to gate
    /// archival
    pub identity: Option<String>,
}

/// Everything the pipeline needs, passed in once at construction; nothing is
/// read from ambient global state.
pub struct PipelineOptions {
    pub catalog: CatalogSettings,
    pub warehouse: WarehouseSettings,
    pub archive: ArchiveSettings,
    pub warehouse_client: Arc<dyn Warehouse>,
    pub archive_store: Option<Arc<dyn ObjectStore>>,
}

/// The orchestrator. Safe to share across concurrent invocations: the
/// catalog is read-only and the executor is stateless.
pub struct QueryPipeline {
    catalog: QueryCatalog,
    executor: QueryExecutor,
    archive: ArchiveSettings,
    archive_store: Option<Arc<dyn ObjectStore>>,
}

impl QueryPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            catalog: QueryCatalog::new(options.catalog.directory),
            executor: QueryExecutor::new(options.warehouse_client, &options.warehouse),
            archive: options.archive,
            archive_store: options.archive_store,
        }
    }

    /// The sole execution entry point: name + caller parameters in, envelope
    /// or typed error out.
    pub async fn execute_named_query(
        &self,
        name: &str,
        params: &HashMap<String, String>,
        caller: &CallerContext,
    ) -> Result<ResultEnvelope> {
        let template = self.catalog.load(name)?;
        let statements = split_statements(&template.body);
        let bound = bind(
            &template.parameters,
            params,
            caller.authorization.as_deref(),
        )?;

        tracing::debug!(
            query = template.name,
            declared = template.parameters.len(),
            has_count = statements.metadata.is_some(),
            "executing named query"
        );

        let (outcome, total_rows) = match statements.metadata.as_deref() {
            Some(count_sql) => {
                let (main_result, count_result) = tokio::join!(
                    self.executor.run(&statements.main, &bound.values),
                    counter::total_rows(&self.executor, count_sql, &bound.values),
                );
                let outcome = main_result?;
                let total = match count_result {
                    Ok(total) => Some(total),
                    Err(e) => {
                        tracing::warn!(
                            query = template.name,
                            error = %e,
                            "count statement failed; omitting pagination total"
                        );
                        None
                    }
                };
                (outcome, total)
            }
            None => (
                self.executor.run(&statements.main, &bound.values).await?,
                None,
            ),
        };

        tracing::info!(
            query = template.name,
            rows = outcome.results.len(),
            truncated = outcome.truncated,
            total_rows,
            "query completed"
        );

        let envelope = ResultEnvelope {
            results: outcome.results,
            truncated: outcome.truncated,
            headers: outcome.headers,
            description: template.parameters.to_json(),
            request_params: bound.redacted,
            response_details: outcome.details,
            total_rows,
        };

        self.maybe_archive(&template.name, caller, &envelope).await;

        Ok(envelope)
    }

    /// Introspection: declared parameter documentation, nothing executed.
    pub fn describe_named_query(&self, name: &str) -> Result<ParameterMetadata> {
        Ok(self.catalog.load(name)?.parameters)
    }

    /// Best-effort archival for allow-listed queries requested by recognized
    /// internal identities. Never fails the invocation.
    async fn maybe_archive(&self, name: &str, caller: &CallerContext, envelope: &ResultEnvelope) {
        let Some(store) = &self.archive_store else {
            return;
        };
        if !self.archive.enabled || !self.archive.queries.iter().any(|q| q == name) {
            return;
        }
        let internal = caller
            .identity
            .as_ref()
            .is_some_and(|id| self.archive.internal_identities.iter().any(|i| i == id));
        if !internal {
            return;
        }

        let content = match serde_json::to_vec(envelope) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(query = name, error = %e, "archival serialization failed");
                return;
            }
        };

        let path = format!("{}/latest.json", name);
        match store.put(&path, &content, "application/json").await {
            Ok(()) => tracing::debug!(query = name, path, "archived result"),
            Err(e) => tracing::warn!(query = name, error = %e, "archival write failed"),
        }
    }
}
