//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised synchronously by the realtime layer.
///
/// Operational failures (transport, authentication, reconnection) never show
/// up here; they are reported asynchronously as events. Only caller misuse,
/// such as a room key that does not parse, is returned directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    #[error("malformed room key `{0}`: expected `{{kind}}:{{id}}`")]
    MalformedRoomKey(String),
    #[error("unknown room kind `{0}`: expected post, conversation or poll")]
    UnknownRoomKind(String),
    #[error("unknown event `{0}`")]
    UnknownEventName(String),
}

/// RFC7807 Problem Details (application/problem+json)
///
/// Used by the relay server's HTTP endpoints so publishers get a readable
/// reason instead of a bare status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://hubbub.dev/problems/bad-request".to_string(),
            title: "Bad Request".to_string(),
            status: 400,
            detail: Some(detail.into()),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://hubbub.dev/problems/unauthorized".to_string(),
            title: "Unauthorized".to_string(),
            status: 401,
            detail: Some(detail.into()),
        }
    }
}

impl From<RealtimeError> for ProblemDetails {
    fn from(err: RealtimeError) -> Self {
        ProblemDetails::bad_request(err.to_string())
    }
}
