//! Serving certificate management for the primary listener.
//!
//! The certificate and key are re-read whenever their directories change, and on a fallback
//! interval, then swapped in as a unit. Certificates rotated on disk (e.g. by cert-manager updating
//! a mounted secret) are picked up without a restart.
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustls::crypto::ring::sign::any_supported_type;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use snafu::{ensure, OptionExt, ResultExt};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{event, instrument, Level};

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, TlsError>;

/// Locations of the PEM encoded certificate chain and private key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificatePaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Hands the currently active certificate to every TLS handshake.
pub struct ReloadableCertResolver {
    active: RwLock<Arc<CertifiedKey>>,
}

impl ReloadableCertResolver {
    fn new(certified_key: CertifiedKey) -> Self {
        ReloadableCertResolver {
            active: RwLock::new(Arc::new(certified_key)),
        }
    }

    /// The certificate that new handshakes are served with.
    pub fn current(&self) -> Arc<CertifiedKey> {
        // The lock only ever guards a pointer swap, so a poisoned lock still holds a complete pair.
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, certified_key: CertifiedKey) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(certified_key);
    }
}

impl fmt::Debug for ReloadableCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadableCertResolver")
            .field("chain_length", &self.current().cert.len())
            .finish()
    }
}

impl ResolvesServerCert for ReloadableCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current())
    }
}

/// Builds a signing certificate from PEM encoded bytes. The private key must belong to the leaf
/// certificate, so a pair caught halfway through a rotation is rejected.
pub fn certified_key_from_pem(
    paths: &CertificatePaths,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<CertifiedKey> {
    let chain = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .context(error::ParseCertificateSnafu { path: &paths.cert })?;
    ensure!(
        !chain.is_empty(),
        error::NoCertificateSnafu { path: &paths.cert }
    );

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .context(error::ParsePrivateKeySnafu { path: &paths.key })?
        .context(error::NoPrivateKeySnafu { path: &paths.key })?;
    let signing_key =
        any_supported_type(&key).context(error::UnsupportedPrivateKeySnafu { path: &paths.key })?;

    let certified_key = CertifiedKey::new(chain, signing_key);
    certified_key
        .keys_match()
        .context(error::KeyMismatchSnafu { paths: paths.clone() })?;
    Ok(certified_key)
}

/// Watches the certificate files and swaps the active certificate when their content changes.
#[derive(Debug)]
pub struct CertificateWatcher {
    paths: CertificatePaths,
    interval: Duration,
    resolver: Arc<ReloadableCertResolver>,
    // Bytes of the last pair that loaded successfully.
    snapshot: (Vec<u8>, Vec<u8>),
}

impl CertificateWatcher {
    /// Loads the initial certificate. Failing to do so is fatal to the webhook.
    #[instrument(err)]
    pub fn load(paths: CertificatePaths, interval: Duration) -> Result<Self> {
        let cert_pem =
            std::fs::read(&paths.cert).context(error::ReadFileSnafu { path: &paths.cert })?;
        let key_pem = std::fs::read(&paths.key).context(error::ReadFileSnafu { path: &paths.key })?;
        let certified_key = certified_key_from_pem(&paths, &cert_pem, &key_pem)?;

        event!(Level::INFO, cert = ?paths.cert, "Loaded TLS certificate.");
        Ok(CertificateWatcher {
            paths,
            interval,
            resolver: Arc::new(ReloadableCertResolver::new(certified_key)),
            snapshot: (cert_pem, key_pem),
        })
    }

    pub fn resolver(&self) -> Arc<ReloadableCertResolver> {
        Arc::clone(&self.resolver)
    }

    /// A server configuration whose certificate always follows the watcher.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(self.resolver())
    }

    /// Re-reads both files and swaps the certificate if either changed. Returns whether a new
    /// certificate was installed. On error the active certificate is kept, and since the snapshot
    /// isn't advanced the same files are retried on the next call.
    pub async fn reload_if_changed(&mut self) -> Result<bool> {
        let cert_pem = tokio::fs::read(&self.paths.cert)
            .await
            .context(error::ReadFileSnafu {
                path: &self.paths.cert,
            })?;
        let key_pem = tokio::fs::read(&self.paths.key)
            .await
            .context(error::ReadFileSnafu {
                path: &self.paths.key,
            })?;

        if (&cert_pem, &key_pem) == (&self.snapshot.0, &self.snapshot.1) {
            return Ok(false);
        }

        let certified_key = certified_key_from_pem(&self.paths, &cert_pem, &key_pem)?;
        self.resolver.replace(certified_key);
        self.snapshot = (cert_pem, key_pem);
        Ok(true)
    }

    /// Directories holding the certificate files. Kubernetes updates a mounted secret by swapping a
    /// symlink next to the files, so the directories are watched rather than the files themselves.
    fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = [&self.paths.cert, &self.paths.key]
            .iter()
            .map(|path| match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            })
            .collect();
        dirs.dedup();
        dirs
    }

    fn watch_files(&self) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                // Reads, including the watcher's own, don't change anything.
                Ok(Event {
                    kind: EventKind::Access(AccessKind::Close(AccessMode::Write)),
                    ..
                }) => {
                    let _ = changes_tx.send(());
                }
                Ok(event) if event.kind.is_access() => {}
                Ok(_) => {
                    let _ = changes_tx.send(());
                }
                Err(err) => event!(Level::WARN, error = %err, "Certificate file watch error."),
            },
            notify::Config::default(),
        )?;
        for dir in self.watched_dirs() {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }
        Ok((watcher, changes_rx))
    }

    async fn reload(&mut self) {
        match self.reload_if_changed().await {
            Ok(true) => event!(Level::INFO, cert = ?self.paths.cert, "Reloaded TLS certificate."),
            Ok(false) => {}
            Err(err) => event!(
                Level::WARN,
                error = %err,
                "Failed to reload TLS certificate, keeping the active one."
            ),
        }
    }

    /// Reloads the certificate on file changes and on every interval tick until `shutdown` flips to
    /// `true` or its sender goes away. If the files can't be watched, only the interval applies.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let (_file_watcher, mut changes) = match self.watch_files() {
            Ok((file_watcher, changes)) => (Some(file_watcher), Some(changes)),
            Err(err) => {
                event!(
                    Level::WARN,
                    error = %err,
                    "Unable to watch certificate files, falling back to polling."
                );
                (None, None)
            }
        };

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the initial pair is already loaded.
        ticker.tick().await;

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => self.reload().await,
                Some(()) = next_change(&mut changes) => self.reload().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        event!(Level::DEBUG, "Certificate watcher stopped.");
    }
}

/// Waits for the next burst of file events. One rotation produces many events, and a single reload
/// covers all of them.
async fn next_change(changes: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    let changes = match changes {
        Some(changes) => changes,
        None => return std::future::pending().await,
    };
    changes.recv().await?;
    while changes.try_recv().is_ok() {}
    Some(())
}

pub use error::TlsError;

pub mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TlsError {
        #[snafu(display("Unable to read '{}': {}", path.display(), source))]
        ReadFile {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Unable to parse certificates in '{}': {}", path.display(), source))]
        ParseCertificate {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("No certificate found in '{}'", path.display()))]
        NoCertificate { path: PathBuf },

        #[snafu(display("Unable to parse private key in '{}': {}", path.display(), source))]
        ParsePrivateKey {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("No private key found in '{}'", path.display()))]
        NoPrivateKey { path: PathBuf },

        #[snafu(display("Unsupported private key in '{}': {}", path.display(), source))]
        UnsupportedPrivateKey {
            path: PathBuf,
            source: rustls::Error,
        },

        #[snafu(display(
            "Private key '{}' does not belong to certificate '{}': {}",
            paths.key.display(),
            paths.cert.display(),
            source
        ))]
        KeyMismatch {
            paths: super::CertificatePaths,
            source: rustls::Error,
        },
    }
}
