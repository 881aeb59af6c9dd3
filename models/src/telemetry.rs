//! Tracing setup for the conversion webhook, configured from the environment.
//!
//! * `TRACING_FILTER_DIRECTIVE`: an `EnvFilter` directive. Defaults to `info` for the webhook with
//!   the HTTP, TLS and file-watching dependencies held at `warn`.
//! * `LOGGING_FORMATTER`: one of `full`, `compact`, `pretty` or `json`. Defaults to `pretty`.
//! * `LOGGING_ANSI_ENABLED`: `true` or `false`. Defaults to `false`.
use serde::Deserialize;
use snafu::ResultExt;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, EnvFilter, Registry};

use std::env;

const DEFAULT_TRACING_FILTER_DIRECTIVE: &str =
    "info,actix_server=warn,actix_http=warn,h2=warn,rustls=warn,notify=warn";

const TRACING_FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const LOGGING_FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const LOGGING_ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// The message format for logging tracing events.
///
/// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/index.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Human-readable, single-line logs for each event.
    Full,
    /// A variant of the default formatter optimized for short line lengths.
    Compact,
    #[default]
    /// Pretty-formatted multi-line logs optimized for human readability.
    Pretty,
    /// Newline-delimited JSON logs, one flat object per event.
    Json,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TelemetryConfig {
    pub filter_directive: String,
    pub message_format: MessageFormat,
    pub ansi_enabled: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which maps an environment variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter_directive = lookup(TRACING_FILTER_DIRECTIVE_ENV_VAR)
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TRACING_FILTER_DIRECTIVE.to_string());

        let message_format = match lookup(LOGGING_FORMATTER_ENV_VAR) {
            Some(formatter) => serde_plain::from_str::<MessageFormat>(&formatter)
                .context(error::LogFormatterEnvSnafu { env_value: formatter })?,
            None => MessageFormat::default(),
        };

        let ansi_enabled = match lookup(LOGGING_ANSI_ENABLED_ENV_VAR) {
            Some(ansi_enabled) => ansi_enabled
                .to_lowercase()
                .parse::<bool>()
                .context(error::LogAnsiEnvSnafu { env_value: ansi_enabled })?,
            None => false,
        };

        Ok(TelemetryConfig {
            filter_directive,
            message_format,
            ansi_enabled,
        })
    }

    /// Unparsable directives are dropped rather than failing startup.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy(&self.filter_directive)
    }

    /// Installs the global subscriber.
    pub fn init(&self) -> Result<()> {
        let subscriber = Registry::default().with(self.env_filter());
        let ansi = self.ansi_enabled;

        // The layers are all different types, so each arm installs its own subscriber.
        let installed = match self.message_format {
            MessageFormat::Full => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().with_ansi(ansi)),
            ),
            MessageFormat::Compact => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().compact().with_ansi(ansi)),
            ),
            MessageFormat::Pretty => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().pretty().with_ansi(ansi)),
            ),
            // The request's root span carries the ConversionReview uid, so only the current span
            // is attached to each line.
            MessageFormat::Json => tracing::subscriber::set_global_default(
                subscriber.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_ansi(ansi),
                ),
            ),
        };
        installed.context(error::TracingConfigurationSnafu)
    }
}

pub fn init_telemetry_from_env() -> Result<()> {
    TelemetryConfig::from_env()?.init()
}

pub mod error {
    use std::str::ParseBoolError;

    use super::*;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring tracing: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            LOGGING_FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOGGING_ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

type Result<T> = std::result::Result<T, TelemetryConfigError>;
pub use error::TelemetryConfigError;
