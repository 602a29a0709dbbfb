//! Mapping of pipeline failures to HTTP responses.
//!
//! This is the only place error variants are turned into status codes and
//! bodies. Client-facing bodies are fixed; internal detail only ever goes to
//! the server log.

use axum::http::header::WWW_AUTHENTICATE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::server::validation::FieldViolation;

pub const UNAUTHORIZED_DETAIL: &str = "Invalid credentials.";
pub const VALIDATION_DETAIL: &str = "Validation error";
pub const INTERNAL_DETAIL: &str = "Internal server error occured.";

/// 422 response body.
#[derive(Debug, Serialize)]
pub struct ValidationErrorBody {
    pub detail: &'static str,
    pub errors: Vec<FieldViolation>,
}

#[derive(Debug)]
pub enum ApiError {
    /// Credentials missing or wrong (401).
    Unauthorized,
    /// Request body violations, all of them (422).
    Validation(Vec<FieldViolation>),
    /// Anything unexpected in the request path (500).
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Unauthorized => (
                status,
                [(WWW_AUTHENTICATE, "Basic")],
                Json(json!({ "detail": UNAUTHORIZED_DETAIL })),
            )
                .into_response(),
            ApiError::Validation(errors) => (
                status,
                Json(ValidationErrorBody {
                    detail: VALIDATION_DETAIL,
                    errors,
                }),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!(error = ?err, "Request failed with internal error");
                internal_error_response()
            }
        }
    }
}

/// The opaque 500 response.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": INTERNAL_DETAIL })),
    )
        .into_response()
}
