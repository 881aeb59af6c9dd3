use snafu::Snafu;

/// The error type for the conversion engine. Every variant is reported to the kube-apiserver inside
/// a `Failure` ConversionReview rather than as a transport-level error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConversionError {
    #[snafu(display(
        "Conversion from a version to itself should not call the webhook: {}",
        version
    ))]
    SelfConversion { version: String },

    #[snafu(display("Unexpected conversion of {} from {} to {}", kind, from, to))]
    UnsupportedVersionPair {
        kind: String,
        from: String,
        to: String,
    },

    #[snafu(display("Invalid {} value: {}", field, reason))]
    MalformedField { field: String, reason: String },

    #[snafu(display("Failed to convert {} from {} to {}: {}", kind, from, to, source))]
    ConversionFailed {
        kind: String,
        from: String,
        to: String,
        source: TypedConversionError,
    },
}

/// A coarse classification of [`ConversionError`], for callers that branch on the failure category
/// without caring about its details.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConversionErrorKind {
    SelfConversion,
    UnsupportedVersionPair,
    MalformedField,
    ConversionFailed,
}

impl ConversionError {
    pub fn kind(&self) -> ConversionErrorKind {
        match self {
            ConversionError::SelfConversion { .. } => ConversionErrorKind::SelfConversion,
            ConversionError::UnsupportedVersionPair { .. } => {
                ConversionErrorKind::UnsupportedVersionPair
            }
            ConversionError::MalformedField { .. } => ConversionErrorKind::MalformedField,
            ConversionError::ConversionFailed { .. } => ConversionErrorKind::ConversionFailed,
        }
    }
}

/// Failures raised while delegating to a typed schema conversion.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TypedConversionError {
    #[snafu(display("Failed to convert json object to {}: {}", schema, source))]
    JsonToSchema {
        schema: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to convert {} to json object: {}", schema, source))]
    SchemaToJson {
        schema: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("{} rejected the conversion: {}", schema, source))]
    Transform {
        schema: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors raised while assembling the rule table at startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuleTableError {
    #[snafu(display(
        "More than one conversion rule registered for {} from {} to {}",
        kind,
        from,
        to
    ))]
    DuplicateRule {
        kind: String,
        from: String,
        to: String,
    },

    #[snafu(display("Conversion rule from {} to itself is not allowed", version))]
    SelfConversionRule { version: String },
}
