//! Lifecycle of the webhook's two listeners.
//!
//! The primary listener serves ConversionReviews over TLS and the metrics listener serves
//! prometheus metrics in plaintext. Both share one shutdown trigger: a termination signal, or either
//! listener exiting on its own, gracefully stops the other one and the certificate watcher.
use crate::api::{primary_routes, ConversionHandler};
use crate::config::{listen_address, WebhookArgs};
use crate::error::{self, Result};
use crate::metrics::metrics_routes;
use crate::telemetry::WebhookRootSpanBuilder;
use crate::tls::CertificateWatcher;

use actix_web::{dev::Server, web::Data, App, HttpServer};
use prometheus::Registry;
use snafu::ResultExt;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::{event, Level};
use tracing_actix_web::TracingLogger;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const PRIMARY_LISTENER: &str = "primary";
const METRICS_LISTENER: &str = "metrics";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListenerSettings {
    pub address: String,
    pub metrics_address: String,
    pub shutdown_timeout: Duration,
}

impl From<&WebhookArgs> for ListenerSettings {
    fn from(args: &WebhookArgs) -> Self {
        ListenerSettings {
            address: listen_address(&args.address),
            metrics_address: listen_address(&args.metrics_address),
            shutdown_timeout: args.shutdown_timeout(),
        }
    }
}

/// Owns everything the listeners need until they are bound.
#[derive(Debug)]
pub struct ListenerManager {
    settings: ListenerSettings,
    handler: ConversionHandler,
    registry: Registry,
    watcher: CertificateWatcher,
}

impl ListenerManager {
    pub fn new(
        settings: ListenerSettings,
        handler: ConversionHandler,
        registry: Registry,
        watcher: CertificateWatcher,
    ) -> Self {
        ListenerManager {
            settings,
            handler,
            registry,
            watcher,
        }
    }

    /// Binds both listeners. Nothing is served until [`BoundListeners::serve_until`] runs.
    pub fn bind(self) -> Result<BoundListeners> {
        let ListenerManager {
            settings,
            handler,
            registry,
            watcher,
        } = self;
        let shutdown_timeout = settings.shutdown_timeout.as_secs();

        let handler = Data::new(handler);
        let primary = HttpServer::new(move || {
            App::new()
                .wrap(TracingLogger::<WebhookRootSpanBuilder>::new())
                .app_data(handler.clone())
                .configure(primary_routes)
        })
        .disable_signals()
        .shutdown_timeout(shutdown_timeout)
        .bind_rustls_0_23(&settings.address, watcher.server_config())
        .context(error::BindSnafu {
            listener: PRIMARY_LISTENER,
            address: &settings.address,
        })?;
        let primary_addrs = primary.addrs();

        let registry = Data::new(registry);
        let metrics = HttpServer::new(move || {
            App::new()
                .app_data(registry.clone())
                .configure(metrics_routes)
        })
        .workers(1)
        .disable_signals()
        .shutdown_timeout(shutdown_timeout)
        .bind(&settings.metrics_address)
        .context(error::BindSnafu {
            listener: METRICS_LISTENER,
            address: &settings.metrics_address,
        })?;
        let metrics_addrs = metrics.addrs();

        event!(
            Level::INFO,
            primary = ?primary_addrs,
            metrics = ?metrics_addrs,
            "Listeners bound."
        );

        Ok(BoundListeners {
            primary: primary.run(),
            metrics: metrics.run(),
            primary_addrs,
            metrics_addrs,
            watcher,
        })
    }
}

/// Listeners whose sockets are open but which have not started serving yet.
pub struct BoundListeners {
    primary: Server,
    metrics: Server,
    primary_addrs: Vec<SocketAddr>,
    metrics_addrs: Vec<SocketAddr>,
    watcher: CertificateWatcher,
}

impl BoundListeners {
    pub fn primary_addrs(&self) -> &[SocketAddr] {
        &self.primary_addrs
    }

    pub fn metrics_addrs(&self) -> &[SocketAddr] {
        &self.metrics_addrs
    }

    /// Serves both listeners until `termination` completes or one of them exits, then stops
    /// everything gracefully. Returns the first listener error, if any.
    pub async fn serve_until<F>(self, termination: F) -> Result<()>
    where
        F: Future,
    {
        let (trigger, shutdown) = watch::channel(false);
        let trigger = Arc::new(trigger);

        let watcher = actix_web::rt::spawn(self.watcher.run(shutdown.clone()));

        let mut listeners = Box::pin(futures::future::join(
            serve(PRIMARY_LISTENER, self.primary, shutdown.clone(), trigger.clone()),
            serve(METRICS_LISTENER, self.metrics, shutdown, trigger.clone()),
        ));
        let mut termination = Box::pin(termination);

        let (primary_result, metrics_result) = tokio::select! {
            results = &mut listeners => results,
            _ = &mut termination => {
                event!(Level::INFO, "Shutting down listeners.");
                trigger.send_replace(true);
                listeners.await
            }
        };

        trigger.send_replace(true);
        if let Err(err) = watcher.await {
            event!(Level::WARN, error = %err, "Certificate watcher did not stop cleanly.");
        }

        event!(Level::INFO, "Listeners stopped.");
        primary_result.and(metrics_result)
    }
}

async fn serve(
    listener: &'static str,
    server: Server,
    mut shutdown: watch::Receiver<bool>,
    trigger: Arc<watch::Sender<bool>>,
) -> Result<()> {
    let handle = server.handle();
    let mut server = Box::pin(server);

    let exited_early = tokio::select! {
        result = &mut server => Some(result),
        _ = shutdown.wait_for(|stop| *stop) => None,
    };

    let result = match exited_early {
        Some(result) => {
            event!(Level::WARN, listener, "Listener exited before shutdown was requested.");
            result
        }
        None => {
            // The server only acts on the stop command while it is being polled.
            let ((), result) = futures::future::join(handle.stop(true), server).await;
            result
        }
    };

    trigger.send_replace(true);
    event!(Level::DEBUG, listener, "Listener stopped.");
    result.context(error::ServeSnafu { listener })
}

/// Resolves on SIGTERM or SIGINT.
#[derive(Debug)]
pub struct TerminationSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl TerminationSignal {
    /// Registers the signal handlers. Signals that arrive after this call are not lost.
    pub fn listen() -> Result<Self> {
        Ok(TerminationSignal {
            sigterm: signal(SignalKind::terminate()).context(error::SignalHandlerSnafu)?,
            sigint: signal(SignalKind::interrupt()).context(error::SignalHandlerSnafu)?,
        })
    }

    /// Waits for the first termination signal and returns which one arrived.
    pub async fn recv(mut self) -> SignalKind {
        tokio::select! {
            _ = self.sigterm.recv() => {
                event!(Level::INFO, "Received SIGTERM.");
                SignalKind::terminate()
            }
            _ = self.sigint.recv() => {
                event!(Level::INFO, "Received SIGINT.");
                SignalKind::interrupt()
            }
        }
    }
}
