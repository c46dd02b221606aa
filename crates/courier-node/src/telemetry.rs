// Telemetry setup for the courier node
//
// Console logging through tracing-subscriber is always on. With the `otlp`
// feature, spans are also exported over OTLP when an endpoint is configured.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[cfg(feature = "otlp")]
use opentelemetry::{trace::TracerProvider as _, KeyValue};
#[cfg(feature = "otlp")]
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
#[cfg(feature = "otlp")]
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};

const DEFAULT_FILTER: &str = "courier=info,courier_node=info";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported with exported spans
    pub service_name: String,
    /// OTLP endpoint (e.g., "http://localhost:4317")
    pub otlp_endpoint: Option<String>,
    /// Log filter (e.g., "info", "courier=debug")
    pub log_filter: Option<String>,
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `OTEL_SERVICE_NAME`: Service name (default: "courier-node")
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint
    /// - `RUST_LOG`: Full filter directive
    /// - `LOG_LEVEL`: Level applied to the courier crates
    pub fn from_env() -> Self {
        let log_filter = std::env::var("RUST_LOG").ok().or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .map(|level| format!("courier={level},courier_node={level}"))
        });

        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "courier-node".to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            log_filter,
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Guard that shuts down the tracer provider when dropped
pub struct TelemetryGuard {
    #[cfg(feature = "otlp")]
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otlp")]
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {:?}", e);
            }
        }
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive for the lifetime of the process.
#[cfg(not(feature = "otlp"))]
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();

    if config.otlp_endpoint.is_some() {
        tracing::warn!("OTEL_EXPORTER_OTLP_ENDPOINT set but the otlp feature is disabled");
    }

    TelemetryGuard {}
}

/// Install the global subscriber, exporting spans when an endpoint is set
///
/// Keep the returned guard alive for the lifetime of the process.
#[cfg(feature = "otlp")]
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(config.filter());

    let (provider, otel_layer, otel_status) = match &config.otlp_endpoint {
        Some(endpoint) => match build_otlp_tracer(endpoint, &config.service_name) {
            Ok((provider, tracer)) => {
                let layer = tracing_opentelemetry::layer().with_tracer(tracer);
                (Some(provider), Some(layer), Some(Ok(endpoint.clone())))
            }
            Err(e) => (None, None, Some(Err(e.to_string()))),
        },
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(otel_layer)
        .init();

    match otel_status {
        Some(Ok(endpoint)) => {
            tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Failed to initialize OTLP tracer, continuing without tracing");
        }
        None => {
            tracing::debug!("OpenTelemetry tracing disabled: OTEL_EXPORTER_OTLP_ENDPOINT not set");
        }
    }

    TelemetryGuard { provider }
}

#[cfg(feature = "otlp")]
fn build_otlp_tracer(
    endpoint: &str,
    service_name: &str,
) -> Result<(SdkTracerProvider, opentelemetry_sdk::trace::Tracer), Box<dyn std::error::Error + Send + Sync>>
{
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let resource = Resource::builder()
        .with_attributes([KeyValue::new("service.name", service_name.to_string())])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("courier");
    Ok((provider, tracer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_filter_falls_back_to_default() {
        let config = TelemetryConfig {
            service_name: "courier-node".into(),
            otlp_endpoint: None,
            log_filter: Some("courier=loud".into()),
        };
        assert_eq!(config.filter().to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }
}
