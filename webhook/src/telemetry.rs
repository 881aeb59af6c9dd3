use crate::api::NO_TELEMETRY_ENDPOINTS;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use lazy_static::lazy_static;
use tracing::Span;
use tracing_actix_web::{DefaultRootSpanBuilder, RootSpanBuilder};

use std::collections::HashSet;

// tracing-actix-web doesn't provide a convenient way to remove any routes from the logs, so we use a global
// settings containing paths to generate empty `tracing::Span`s on paths which we don't want logged.
lazy_static! {
    static ref EXCLUDED_PATHS: HashSet<&'static str> =
        NO_TELEMETRY_ENDPOINTS.iter().copied().collect();
}

/// Builds the root span of every request served by the primary listener. The ConversionReview
/// `uid` is only known once the body is decoded, so the field starts empty and is recorded later.
#[derive(Default)]
pub struct WebhookRootSpanBuilder;

impl RootSpanBuilder for WebhookRootSpanBuilder {
    fn on_request_start(request: &ServiceRequest) -> Span {
        if EXCLUDED_PATHS.contains(request.path()) {
            Span::none()
        } else {
            tracing_actix_web::root_span!(request, conversion_uid = tracing::field::Empty)
        }
    }

    fn on_request_end<B: MessageBody>(
        span: Span,
        response: &std::result::Result<ServiceResponse<B>, actix_web::Error>,
    ) {
        DefaultRootSpanBuilder::on_request_end(span, response);
    }
}
