//! Telemetry and observability initialization.
//!
//! Builds the OpenTelemetry (OTLP) tracing layer from [`TelemetrySettings`]
//! when the `telemetry` feature is enabled; without the feature an identity
//! layer is returned so call sites stay unconditional.

use anyhow::Result;

use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

use crate::config::TelemetrySettings;

/// A `tracing` layer exporting spans over OTLP/gRPC to the configured
/// collector, or a no-op layer when the feature is off.
pub fn otlp_layer<S>(settings: &TelemetrySettings) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    #[cfg(feature = "telemetry")]
    {
        use opentelemetry::trace::TracerProvider;
        use opentelemetry_otlp::WithExportConfig;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&settings.endpoint)
            .build()?;

        let provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", settings.service_name.clone()),
            ]))
            .build();

        let tracer = provider.tracer(settings.service_name.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Box::new(tracing_opentelemetry::OpenTelemetryLayer::new(
            tracer,
        )))
    }
    #[cfg(not(feature = "telemetry"))]
    {
        let _ = settings;
        Ok(Box::new(tracing_subscriber::layer::Identity::new()))
    }
}

/// Flushes pending span batches at shutdown.
pub fn shutdown() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
