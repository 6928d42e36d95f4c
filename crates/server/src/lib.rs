//! Quarry Server: the HTTP boundary.
//!
//! Exposes the query pipeline via:
//! - **REST (8080)**: `/query/{name}` execution and `/query/{name}/describe`
//!   introspection.
//! - **Observability**: Prometheus metrics on `/metrics`, optional
//!   OpenTelemetry tracing.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Opts, Registry};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use quarry_common::config::AppConfig;
use quarry_connectors::credentials::{provider_from_settings, CredentialsProvider};
use quarry_connectors::storage::{HttpObjectStore, ObjectStore};
use quarry_connectors::warehouse::RestWarehouse;
use quarry_pipeline::{PipelineOptions, QueryPipeline};

// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static QUERY_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    let opts = Opts::new("quarry_queries_total", "Total number of named queries executed");
    let counter = IntCounter::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static ACTIVE_QUERIES: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("quarry_active_queries", "Number of currently active queries");
    let gauge = IntGauge::with_opts(opts).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub mod api;
pub mod auth;

pub use auth::caller_context;

pub struct QuarryServer {
    config_path: String,
    observability_enabled: bool,
}

impl Default for QuarryServer {
    fn default() -> Self {
        Self {
            config_path: "config/quarry.yaml".to_string(),
            observability_enabled: false,
        }
    }
}

impl QuarryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config_path: &str) -> Self {
        self.config_path = config_path.to_string();
        self
    }

    pub fn with_observability(mut self, enabled: bool) -> Self {
        self.observability_enabled = enabled;
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = AppConfig::from_file(&self.config_path)?;

        let otel_layer = if self.observability_enabled {
            quarry_common::telemetry::otlp_layer(&config.telemetry)?
        } else {
            Box::new(tracing_subscriber::layer::Identity::new())
        };

        // Ensure logs directory exists
        std::fs::create_dir_all("logs").ok();

        let errors_appender = tracing_appender::rolling::daily("logs", "errors.jsonl");
        let errors_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(errors_appender)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                metadata.target() == "errors"
            }));

        let stdout_layer =
            tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(otel_layer)
            .with(errors_layer)
            .try_init()
            .ok();

        let credentials: Arc<dyn CredentialsProvider> =
            Arc::from(provider_from_settings(&config.warehouse.credentials));

        let warehouse = Arc::new(RestWarehouse::new(
            config.warehouse.api_url.clone(),
            credentials.clone(),
        ));

        let archive_store: Option<Arc<dyn ObjectStore>> =
            if config.archive.enabled && !config.archive.base_url.is_empty() {
                Some(Arc::new(
                    HttpObjectStore::new(config.archive.base_url.clone())
                        .with_credentials(credentials.clone()),
                ))
            } else {
                None
            };

        let pipeline = Arc::new(QueryPipeline::new(PipelineOptions {
            catalog: config.catalog.clone(),
            warehouse: config.warehouse.clone(),
            archive: config.archive.clone(),
            warehouse_client: warehouse,
            archive_store,
        }));

        let app = Router::new()
            .route("/health", get(api::health_handler))
            .route("/metrics", get(api::metrics_handler))
            .merge(api::create_api_router(pipeline));

        let addr: SocketAddr = config
            .server
            .listen_addr
            .parse()
            .context(format!("Invalid listen address: {}", config.server.listen_addr))?;

        info!("{} listening on {}", config.server.name, addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;
        axum::serve(listener, app).await?;

        quarry_common::telemetry::shutdown();
        Ok(())
    }
}
