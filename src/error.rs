//! Error types for the waste-management service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate or ineligible request; the message says what to do instead.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_kind = match self {
            ApiError::Storage(ref e) => {
                tracing::error!("Storage error: {:?}", e);
                "Storage error"
            }
            ApiError::Validation(_) => "Bad request",
            ApiError::NotFound(_) => "Resource not found",
            ApiError::Conflict(_) => "Request rejected",
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                "Internal error"
            }
        };

        let body = Json(json!({
            "error": error_kind,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
