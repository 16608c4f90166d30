// src/server/error.rs

//! Mapping of crate errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::errors::JobtailError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<JobtailError> for ApiError {
    fn from(err: JobtailError) -> Self {
        if err.is_not_found() {
            return ApiError::NotFound(err.to_string());
        }
        match err {
            JobtailError::InvalidArgument(_) | JobtailError::InvalidState(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_statuses() {
        let cases = [
            (JobtailError::invalid("empty command"), StatusCode::BAD_REQUEST),
            (
                JobtailError::InvalidState("already started".into()),
                StatusCode::BAD_REQUEST,
            ),
            (JobtailError::not_found("job x"), StatusCode::NOT_FOUND),
            (
                JobtailError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)),
                StatusCode::NOT_FOUND,
            ),
            (
                JobtailError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
