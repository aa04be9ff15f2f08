//! Rendering of runtime errors as HTTP responses.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use node_runtime::{Error, RuntimeProvider};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<RuntimeProvider>,
}

/// Handler error: a runtime [`Error`] rendered as `{code, message, suggestion, provider}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(
            Error::bad_request(format!("Invalid request body: {}", rejection.body_text()))
                .with_suggestion("Send a JSON body with Content-Type: application/json"),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::bad_request(format!(
            "Invalid query string: {}",
            rejection.body_text()
        )))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(Error::bad_request(format!("Invalid path: {}", rejection.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = err.code(), error = ?err, "{}", err.message());
        } else {
            warn!(code = err.code(), error = %err, "{}", err.message());
        }

        let body = ErrorBody {
            code: status.as_u16(),
            message: err.message().to_string(),
            suggestion: err.suggestion().unwrap_or_default().to_string(),
            provider: err.provider(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
