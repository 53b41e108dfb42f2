//! HTTP route handlers.

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hubbub_shared::{ProblemDetails, RealtimeError};

pub mod events;
pub mod health;

/// Rejection rendered as `application/problem+json`.
#[derive(Debug)]
pub struct Problem(pub ProblemDetails);

impl From<RealtimeError> for Problem {
    fn from(err: RealtimeError) -> Self {
        Problem(err.into())
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(CONTENT_TYPE, "application/problem+json")],
            Json(self.0),
        )
            .into_response()
    }
}
