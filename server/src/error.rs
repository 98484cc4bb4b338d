//! Central error taxonomy (§7). Every fallible path in the server funnels
//! into `AppError` so the REST surface has one place that maps failures to
//! status codes; storage/library failures are wrapped, never re-thrown raw.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bearer token missing")]
    AuthMissing,
    #[error("token invalid: {0}")]
    AuthInvalid(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("token expired")]
    TokenExpired,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::AuthMissing => "AuthMissing",
            AppError::AuthInvalid(_) => "AuthInvalid",
            AppError::PermissionDenied => "PermissionDenied",
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::InvalidPayload(_) => "InvalidPayload",
            AppError::Conflict(_) => "Conflict",
            AppError::TokenExpired => "TokenExpired",
            AppError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::AuthMissing => StatusCode::UNAUTHORIZED,
            AppError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::TokenExpired => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            tracing::warn!("internal error: {e:#}");
        }
        let status = self.status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
