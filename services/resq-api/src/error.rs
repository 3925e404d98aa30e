//! Request-level errors and their HTTP mapping
//!
//! Every failure is answered with a JSON body of the form `{"detail": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::caption::CaptionError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("All {keys} API keys are rate limited. Please try again later.")]
    KeysExhausted { keys: usize },

    #[error("All API keys exhausted. Please try again later.")]
    NoBackupKeys,

    #[error("API Error: {0}")]
    Upstream(String),

    #[error("Error: {0}")]
    Internal(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Caption service error: {0}")]
    Caption(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::KeysExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoBackupKeys => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Caption(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<key_pool::Error> for ApiError {
    fn from(err: key_pool::Error) -> Self {
        match err {
            key_pool::Error::Exhausted { keys, .. } => ApiError::KeysExhausted { keys },
            key_pool::Error::NoBackupKeys => ApiError::NoBackupKeys,
            key_pool::Error::Remote { status, message } => {
                ApiError::Upstream(format!("{status}: {message}"))
            }
            key_pool::Error::Unexpected(msg) => ApiError::Internal(msg),
            key_pool::Error::NoKeys => ApiError::Internal(key_pool::Error::NoKeys.to_string()),
        }
    }
}

impl From<CaptionError> for ApiError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::EmptyImage => ApiError::BadRequest(CaptionError::EmptyImage.to_string()),
            other => ApiError::Caption(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
