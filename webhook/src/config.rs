use crate::tls::CertificatePaths;

use argh::FromArgs;
use models::constants::{
    PRIVATE_KEY_NAME, PUBLIC_KEY_NAME, TLS_KEY_MOUNT_PATH, WEBHOOK_DEFAULT_ADDRESS,
    WEBHOOK_DEFAULT_MAX_REQUEST_BYTES, WEBHOOK_DEFAULT_METRICS_ADDRESS,
};

use std::path::PathBuf;
use std::time::Duration;

fn default_address() -> String {
    WEBHOOK_DEFAULT_ADDRESS.to_string()
}

fn default_metrics_address() -> String {
    WEBHOOK_DEFAULT_METRICS_ADDRESS.to_string()
}

fn default_cert_file() -> PathBuf {
    PathBuf::from(TLS_KEY_MOUNT_PATH).join(PUBLIC_KEY_NAME)
}

fn default_key_file() -> PathBuf {
    PathBuf::from(TLS_KEY_MOUNT_PATH).join(PRIVATE_KEY_NAME)
}

#[derive(FromArgs, Debug, PartialEq)]
/// Serves CustomResourceDefinition conversion reviews for the kube-apiserver.
pub struct WebhookArgs {
    /// address the conversion endpoint listens on, e.g. ":8443"
    #[argh(option, default = "default_address()")]
    pub address: String,

    /// address the metrics endpoint listens on, e.g. ":8080"
    #[argh(option, default = "default_metrics_address()")]
    pub metrics_address: String,

    /// PEM encoded certificate chain served on the conversion endpoint
    #[argh(option, default = "default_cert_file()")]
    pub tls_cert_file: PathBuf,

    /// PEM encoded private key matching the certificate
    #[argh(option, default = "default_key_file()")]
    pub tls_key_file: PathBuf,

    /// seconds between checks of the certificate files for changes
    #[argh(option, default = "10")]
    pub cert_reload_interval_secs: u64,

    /// seconds granted to in-flight requests on shutdown
    #[argh(option, default = "30")]
    pub shutdown_timeout_secs: u64,

    /// largest ConversionReview body accepted, in bytes
    #[argh(option, default = "WEBHOOK_DEFAULT_MAX_REQUEST_BYTES")]
    pub max_request_bytes: usize,
}

impl WebhookArgs {
    pub fn certificate_paths(&self) -> CertificatePaths {
        CertificatePaths {
            cert: self.tls_cert_file.clone(),
            key: self.tls_key_file.clone(),
        }
    }

    pub fn cert_reload_interval(&self) -> Duration {
        // A zero period would make the watcher spin.
        Duration::from_secs(self.cert_reload_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Turns a listen address into something `bind` accepts. A bare `:port` means every IPv4
/// interface.
pub fn listen_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => address.to_string(),
    }
}
