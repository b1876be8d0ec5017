use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::schema::FieldError;

// Errors a handler or extractor can return; each maps to one HTTP status
#[derive(Debug, Error)]
pub enum AppError {
    /// Username or email already taken (400)
    #[error("{0}")]
    Conflict(String),

    /// Referenced row does not exist (404)
    #[error("{0}")]
    NotFound(String),

    /// Request body or path failed validation (422)
    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    /// Storage fault (500, logged)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else that is not the caller's fault (500, logged)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Conflict(message) | Self::NotFound(message) => {
                tracing::info!(%status, "{}", message);
                json!({
                    "status": "fail",
                    "message": message,
                })
            }
            Self::Validation(errors) => json!({
                "status": "fail",
                "message": "Request validation failed",
                "errors": errors,
            }),
            Self::Database(_) | Self::Internal(_) => {
                // Details stay in the log
                tracing::error!("{}", self);
                json!({
                    "status": "error",
                    "message": "an internal error occurred",
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(vec![FieldError::new("body", rejection.body_text())])
    }
}
