use crate::negotiation::{CodecError, NegotiationError};

use actix_web::{error::PayloadError, http::StatusCode, HttpResponse, ResponseError};
use snafu::Snafu;

/// Failures that prevent a ConversionReview from being answered at all. Conversion failures are not
/// among them: those are reported inside a `Failure` review.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReviewError {
    #[snafu(display("Unable to decode the request body: {}", source))]
    UnsupportedMediaType { source: NegotiationError },

    #[snafu(display("Unable to encode the response body: {}", source))]
    NotAcceptable { source: NegotiationError },

    #[snafu(display("Malformed ConversionReview: {}", source))]
    MalformedRequest { source: CodecError },

    #[snafu(display("Request body exceeds the limit of {} bytes", limit))]
    PayloadTooLarge { limit: usize },

    #[snafu(display("Failed to read the request body: {}", source))]
    ReadBody { source: PayloadError },

    #[snafu(display("Failed to encode the ConversionReview response: {}", source))]
    EncodeResponse { source: CodecError },
}

impl ReviewError {
    /// Whether the failure lies with the webhook rather than with the caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ReviewError::ReadBody { .. } | ReviewError::EncodeResponse { .. }
        )
    }
}

impl ResponseError for ReviewError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReviewError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ if self.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).finish()
    }
}
