//! Installs a default `CryptoProvider` for use with `rustls`.
//!
//! While the default *should* be correctly selected based on the feature flags chosen for rustls,
//! it is easy to accidentally enable multiple providers and make the default selection ambiguous
//! for `rustls`, which results in a panic the first time a `ServerConfig` is built.

use rustls::crypto::CryptoProvider;
use snafu::Snafu;

/// Installs the `ring` provider as the process-wide default.
///
/// Returns an error if a provider has already been installed.
pub fn install_default_crypto_provider() -> Result<(), CryptoConfigError> {
    CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| CryptoConfigError)
}

/// Like [`install_default_crypto_provider`], but tolerates a provider installed earlier in the
/// process. Used by tests, which share one process across many servers.
pub fn ensure_default_crypto_provider() {
    if CryptoProvider::get_default().is_none() {
        let _ = install_default_crypto_provider();
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Failed to install crypto provider."), visibility(pub))]
pub struct CryptoConfigError;
