//! The routes served on the primary (TLS) listener.
mod convert;
mod error;
mod ping;

pub use self::convert::{convert_custom_resources, ConversionHandler};
pub use self::error::ReviewError;

use models::constants::{WEBHOOK_CRD_CONVERT_ENDPOINT, WEBHOOK_HEALTH_CHECK_ROUTE};

use actix_web::web;

// The set of endpoints for which `tracing::Span`s will not be recorded.
pub const NO_TELEMETRY_ENDPOINTS: &[&str] = &[WEBHOOK_HEALTH_CHECK_ROUTE];

/// Registers the conversion and health check routes. The caller provides a
/// `web::Data<ConversionHandler>` as app data.
pub fn primary_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(WEBHOOK_CRD_CONVERT_ENDPOINT)
            .route(web::post().to(convert::convert_custom_resources)),
    )
    .route(
        WEBHOOK_HEALTH_CHECK_ROUTE,
        web::get().to(ping::health_check),
    );
}
