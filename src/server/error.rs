//! HTTP error mapping.

use crate::{Error, ErrorCategory};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error returned by handlers and middleware.
///
/// | Category | Status |
/// |----------|--------|
/// | transport | 400 |
/// | validation | 400 |
/// | persistence, timeout | 504 |
/// | persistence, other | 500 |
/// | configuration | 500 |
#[derive(Debug)]
pub struct ApiError(Error);

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ApiError {
    /// Returns the status code for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.category()) {
            (_, ErrorCategory::Transport | ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
            (Error::Timeout { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.category().as_str(),
        };
        (status, Json(body)).into_response()
    }
}
