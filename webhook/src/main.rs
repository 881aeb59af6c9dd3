use webhook::api::ConversionHandler;
use webhook::config::WebhookArgs;
use webhook::conversion::ConversionEngine;
use webhook::error::{self, Result};
use webhook::metrics::MetricsExporter;
use webhook::negotiation::CodecTable;
use webhook::server::{ListenerManager, ListenerSettings, TerminationSignal};
use webhook::tls::CertificateWatcher;

use models::{crypto, telemetry};
use snafu::ResultExt;
use tracing::{event, Level};

use std::env;
use std::fs;
use std::sync::Arc;

// By default, errors resulting in termination of the webhook are written to this file,
// which is the location kubernetes uses by default to surface termination-causing errors.
const TERMINATION_LOG: &str = "/dev/termination-log";

#[actix_web::main]
async fn main() {
    let args: WebhookArgs = argh::from_env();
    let termination_log = env::var("TERMINATION_LOG").unwrap_or(TERMINATION_LOG.to_string());

    if let Err(error) = run_webhook(args).await {
        event!(Level::ERROR, %error, "Conversion webhook failed.");
        if let Err(write_error) = fs::write(&termination_log, format!("{}", error)) {
            event!(
                Level::ERROR,
                %write_error,
                termination_log,
                "Could not write k8s termination log."
            );
        }
        std::process::exit(1);
    }
}

async fn run_webhook(args: WebhookArgs) -> Result<()> {
    telemetry::init_telemetry_from_env().context(error::TelemetryInitSnafu)?;
    crypto::install_default_crypto_provider().context(error::CryptoProviderSnafu)?;

    let engine = ConversionEngine::default_rules().context(error::RuleTableSnafu)?;
    let exporter = MetricsExporter::new().context(error::MetricsExporterSnafu)?;
    let handler = ConversionHandler::new(
        Arc::new(CodecTable::default()),
        Arc::new(engine),
        exporter.webhook_metrics(),
    )
    .with_body_limit(args.max_request_bytes);

    let watcher = CertificateWatcher::load(args.certificate_paths(), args.cert_reload_interval())
        .context(error::LoadCertificateSnafu)?;
    let termination = TerminationSignal::listen()?;

    let listeners = ListenerManager::new(
        ListenerSettings::from(&args),
        handler,
        exporter.registry(),
        watcher,
    )
    .bind()?;

    event!(Level::INFO, "Conversion webhook started.");
    listeners.serve_until(termination.recv()).await
}
