use crate::conversion::RuleTableError;
use crate::tls::TlsError;

use models::crypto::CryptoConfigError;
use models::telemetry::TelemetryConfigError;
use opentelemetry::metrics::MetricsError;
use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Error configuring telemetry: '{}'", source))]
    TelemetryInit { source: TelemetryConfigError },

    #[snafu(display("Error configuring TLS crypto provider: '{}'", source))]
    CryptoProvider { source: CryptoConfigError },

    #[snafu(display("Invalid conversion rule table: '{}'", source))]
    RuleTable { source: RuleTableError },

    #[snafu(display("Error configuring the prometheus exporter: '{}'", source))]
    MetricsExporter { source: MetricsError },

    #[snafu(display("Unable to load the TLS certificate: '{}'", source))]
    LoadCertificate { source: TlsError },

    #[snafu(display("Unable to bind the {} listener to '{}': '{}'", listener, address, source))]
    Bind {
        listener: &'static str,
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("Error running the {} listener: '{}'", listener, source))]
    Serve {
        listener: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("Unable to listen for termination signals: '{}'", source))]
    SignalHandler { source: std::io::Error },
}
