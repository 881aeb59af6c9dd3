//! The ConversionReview envelope and batch conversion of its objects.
mod request;
mod response;

pub use self::request::{ConversionReviewRequest, Request};
pub use self::response::{ConversionReviewResponse, ConvertResult, Response, Status};

use crate::conversion::{describe_raw_object, ConversionEngine, ConversionError, ResourceObject};

use snafu::{ResultExt, Snafu};
use tracing::{event, instrument, Level};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BatchConversionError {
    #[snafu(display(
        "Failed to convert objects[{}] ({}) to {}: {}",
        index,
        object,
        desired_version,
        source
    ))]
    ConvertObject {
        index: usize,
        object: String,
        desired_version: String,
        source: ConversionError,
    },
}

/// Converts every object of a ConversionReview request to the desired version and wraps the
/// outcome in a response envelope.
///
/// Sample request in json format:
#[cfg_attr(doctest, doc = " ````no_test")]
/// ```
/// {
///     "apiVersion": "apiextensions.k8s.io/v1",
///     "kind": "ConversionReview",
///     "request": {
///         "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
///         "desiredAPIVersion": "stable.example.com/v2",
///         "objects": [
///             {
///                 "apiVersion": "stable.example.com/v1",
///                 "kind": "Endpoint",
///                 "metadata": {"name": "web", "namespace": "default"},
///                 "hostPort": "10.0.0.1:443"
///             }
///         ]
///     }
/// }
/// ```
/// Sample response in json format:
#[cfg_attr(doctest, doc = " ````no_test")]
/// ```
/// {
///     "apiVersion": "apiextensions.k8s.io/v1",
///     "kind": "ConversionReview",
///     "response": {
///         "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
///         "result": {"status": "Success"},
///         "convertedObjects": [
///             {
///                 "apiVersion": "stable.example.com/v2",
///                 "kind": "Endpoint",
///                 "metadata": {"name": "web", "namespace": "default"},
///                 "host": "10.0.0.1",
///                 "port": "443"
///             }
///         ]
///     }
/// }
/// ```
///
/// A batch never partially succeeds: the first object that fails to convert turns the whole
/// response into a `Failure` carrying no converted objects.
pub fn convert_review(
    req: &ConversionReviewRequest,
    engine: &ConversionEngine,
) -> ConversionReviewResponse {
    let request = &req.request;

    let response = match convert_objects(engine, &request.desired_api_version, &request.objects) {
        Ok(converted_objects) => Response {
            uid: request.uid.clone(),
            result: ConvertResult::success(),
            converted_objects: Some(converted_objects),
        },
        Err(e) => {
            event!(Level::WARN, uid = %request.uid, error = %e, "Conversion review failed.");
            Response {
                uid: request.uid.clone(),
                result: ConvertResult::failure(e.to_string()),
                converted_objects: None,
            }
        }
    };

    ConversionReviewResponse {
        kind: req.kind.clone(),
        api_version: req.api_version.clone(),
        response,
    }
}

#[instrument(
    skip(engine, objects),
    fields(count = objects.len()),
    err(level = Level::DEBUG)
)]
fn convert_objects(
    engine: &ConversionEngine,
    desired_version: &str,
    objects: &[serde_json::Value],
) -> Result<Vec<serde_json::Value>, BatchConversionError> {
    objects
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            ResourceObject::from_value(raw.clone())
                .and_then(|object| engine.convert(&object, desired_version))
                .map(ResourceObject::into_value)
                .context(ConvertObjectSnafu {
                    index,
                    object: describe_raw_object(raw),
                    desired_version,
                })
        })
        .collect()
}
