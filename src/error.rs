use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{
    activation::ActivationError, key_admin::StatusUpdateError, key_issuer::IssuanceError,
};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Service busy: {0}")]
    Busy(String),
}

impl From<IssuanceError> for AppError {
    fn from(e: IssuanceError) -> Self {
        match e {
            IssuanceError::InvalidFormat | IssuanceError::AlreadyExists => {
                AppError::Validation(e.to_string())
            }
            IssuanceError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<ActivationError> for AppError {
    fn from(e: ActivationError) -> Self {
        match e {
            ActivationError::Storage(e) => AppError::Storage(e),
            ActivationError::RetriesExhausted { .. } => AppError::Busy(e.to_string()),
        }
    }
}

impl From<StatusUpdateError> for AppError {
    fn from(e: StatusUpdateError) -> Self {
        match e {
            StatusUpdateError::NotFound => AppError::NotFound(e.to_string()),
            StatusUpdateError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            StatusUpdateError::RetriesExhausted { .. } => AppError::Busy(e.to_string()),
            StatusUpdateError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
