use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReviewResponse {
    pub kind: String,
    pub api_version: String,
    pub response: Response,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConvertResult {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Success,
    Failure,
}

impl ConvertResult {
    pub fn success() -> Self {
        ConvertResult {
            status: Status::Success,
            message: None,
        }
    }

    pub fn failure(message: String) -> Self {
        ConvertResult {
            status: Status::Failure,
            message: Some(message),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub uid: String,
    pub result: ConvertResult,
    /// Present only on success, in the order of the request's objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_objects: Option<Vec<serde_json::Value>>,
}
