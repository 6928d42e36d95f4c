//! Query templating and execution pipeline.
//!
//! The pipeline turns a query name plus caller parameters into a uniform
//! result envelope:
//!
//! 1. **Catalog** (`catalog`): resolve the name to a template file, parse the
//!    `---key: value` metadata header, split off the optional
//!    `# hlx:metadata` count statement.
//! 2. **Binder** (`binder`): reconcile declared parameters with caller
//!    values, coerce types once, resolve and redact the `domainkey` secret.
//! 3. **Executor** (`executor`): stream rows from the warehouse under a
//!    fixed memory budget, truncating early when the sampled row size says
//!    the response would outgrow it.
//! 4. **Counter** (`counter`): run the count statement against the same
//!    bound parameters for pagination totals.
//! 5. **Orchestrator** (`orchestrator`): compose the stages and assemble the
//!    envelope.
//!
//! Every invocation is independent: templates are re-read from disk, nothing
//! is cached, and no shared mutable state exists across concurrent requests.

pub mod binder;
pub mod catalog;
pub mod counter;
pub mod executor;
pub mod orchestrator;

pub use binder::{bind, coerce, BoundParams, DOMAINKEY_PARAM};
pub use catalog::{ParameterMetadata, QueryCatalog, QueryTemplate, TemplateStatements};
pub use executor::{ExecutionOutcome, QueryExecutor, RESULT_SIZE_BUDGET};
pub use orchestrator::{CallerContext, PipelineOptions, QueryPipeline};
