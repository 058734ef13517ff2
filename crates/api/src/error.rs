//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use booking::{ErrorKind, ReservationError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The caller could not be identified from the request.
    #[error("{0}")]
    Unauthenticated(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Reservation failure, classified by its kind.
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl ApiError {
    /// Caller-facing classification, as sent in the `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::BadRequest(_) => ErrorKind::Validation.as_str(),
            ApiError::Reservation(err) => err.kind().as_str(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Reservation(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::counter!("api_errors_total", "kind" => self.kind()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string(), "kind": self.kind() });
        (status, axum::Json(body)).into_response()
    }
}
