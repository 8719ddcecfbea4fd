use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::views::RenderError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Not-found with a caller-chosen status and message, rendered as
    /// `{"error": {"Not Found": message}}`.
    #[error("{message}")]
    NotFound {
        status: StatusCode,
        message: &'static str,
    },
    #[error("a {table} with this {field} already exists")]
    Conflict {
        table: &'static str,
        field: &'static str,
    },
    #[error("forbidden")]
    Forbidden,
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn not_found(message: &'static str) -> Self {
        ApiError::NotFound {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { status, .. } => *status,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { table, field } => ApiError::Conflict { table, field },
            other => {
                error!(error = %other, "database operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        error!(error = %err, "page rendering failed");
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::NotFound { message, .. } => json!({ "error": { "Not Found": message } }),
            ApiError::Conflict { field, .. } => {
                json!({ "error": { "Conflict": self.to_string(), "field": field } })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}
