use serde::{Deserialize, Serialize};

/// A ConversionReview as sent by the kube-apiserver.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReviewRequest {
    pub kind: String,
    pub api_version: String,
    pub request: Request,
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Uniquely identifies this conversion call and must be echoed in the response.
    pub uid: String,
    #[serde(rename = "desiredAPIVersion")]
    pub desired_api_version: String,
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
}
