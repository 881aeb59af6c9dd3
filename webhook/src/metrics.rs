use actix_web::{
    http::header::CONTENT_TYPE,
    web::{self, Data},
    HttpResponse,
};
use models::constants::WEBHOOK_METRICS_ROUTE;
use opentelemetry::{
    metrics::{Counter, Histogram, Meter, MeterProvider, MetricsError},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use snafu::ResultExt;
use tracing::{event, Level};

use std::time::Duration;

pub const OPERATION_CONVERTING: &str = "converting";
const OPERATION_KEY: &str = "operation";
const METER_NAME: &str = "conversion-webhook";

/// The request counters maintained by the webhook.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestCounter {
    Total,
    Invalid,
    InternalError,
    Successful,
}

/// Metric instruments recorded by the conversion handler. Instruments are internally synchronized
/// and cheap to clone, so every worker gets its own handle.
#[derive(Clone, Debug)]
pub struct WebhookMetrics {
    total_requests: Counter<u64>,
    invalid_requests: Counter<u64>,
    internal_error: Counter<u64>,
    successful_requests: Counter<u64>,
    request_duration: Histogram<f64>,
}

impl WebhookMetrics {
    pub fn new(meter: &Meter) -> Self {
        WebhookMetrics {
            total_requests: meter
                .u64_counter("total_requests")
                .with_description("Number of received conversion requests")
                .init(),
            invalid_requests: meter
                .u64_counter("invalid_requests")
                .with_description("Number of conversion requests rejected as invalid")
                .init(),
            internal_error: meter
                .u64_counter("internal_error")
                .with_description("Number of conversion requests failed by an internal error")
                .init(),
            successful_requests: meter
                .u64_counter("successful_requests")
                .with_description("Number of conversion requests answered with a review")
                .init(),
            request_duration: meter
                .f64_histogram("request_duration_seconds")
                .with_description("Time spent handling a conversion request, in seconds")
                .init(),
        }
    }

    pub fn increment(&self, counter: RequestCounter, operation: &'static str) {
        let attributes = [KeyValue::new(OPERATION_KEY, operation)];
        let instrument = match counter {
            RequestCounter::Total => &self.total_requests,
            RequestCounter::Invalid => &self.invalid_requests,
            RequestCounter::InternalError => &self.internal_error,
            RequestCounter::Successful => &self.successful_requests,
        };
        instrument.add(1, &attributes);
    }

    pub fn observe(&self, operation: &'static str, elapsed: Duration) {
        self.request_duration.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new(OPERATION_KEY, operation)],
        );
    }
}

/// The metrics pipeline: an OpenTelemetry meter provider exporting into a prometheus registry.
/// The provider must outlive every [`WebhookMetrics`] created from it.
pub struct MetricsExporter {
    registry: Registry,
    provider: SdkMeterProvider,
}

impl MetricsExporter {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .without_counter_suffixes()
            .without_scope_info()
            .without_target_info()
            .build()?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        Ok(MetricsExporter { registry, provider })
    }

    pub fn webhook_metrics(&self) -> WebhookMetrics {
        WebhookMetrics::new(&self.provider.meter(METER_NAME))
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Renders every registered metric in the prometheus text exposition format.
    pub fn encode(registry: &Registry) -> Result<String, MetricsEncodeError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .context(error::EncodeSnafu)?;
        String::from_utf8(buf).context(error::Utf8Snafu)
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

pub use error::MetricsEncodeError;

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum MetricsEncodeError {
        #[snafu(display("Failed to encode metrics: {}", source))]
        Encode { source: prometheus::Error },

        #[snafu(display("Encoded metrics are not valid UTF-8: {}", source))]
        Utf8 { source: std::string::FromUtf8Error },
    }
}

/// Registers the prometheus route served on the metrics listener. The caller provides a
/// `web::Data<Registry>` as app data.
pub fn metrics_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(WEBHOOK_METRICS_ROUTE, web::get().to(vending_metrics));
}

pub async fn vending_metrics(registry: Data<Registry>) -> HttpResponse {
    match MetricsExporter::encode(&registry) {
        Ok(body) => HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, prometheus::TEXT_FORMAT))
            .body(body),
        Err(err) => {
            event!(Level::ERROR, error = %err, "Unable to vend metrics.");
            HttpResponse::InternalServerError().finish()
        }
    }
}
