//! HTTP error mapping
//!
//! Wraps [`bank_core::BankError`] plus transport-local validation failures
//! into one `IntoResponse` type: a closed set of causes translated to a
//! status code and a JSON body at the edge, nowhere else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bank_core::BankError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Bank(#[from] BankError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Bank(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Bank(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Bank(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let message = match &self {
            ApiError::Bank(e) => e.truncated_message(),
            ApiError::Validation(m) | ApiError::NotFound(m) => m.clone(),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%message, "request failed");
        }
        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
