//! Maps `EngineError` to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, ValidationError};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(ValidationError::SchedulingConflict(_)) => StatusCode::CONFLICT,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InvalidTransition { .. } | EngineError::AlreadyExists(_) => {
            StatusCode::CONFLICT
        }
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::InvalidRequest(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
        EngineError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "request failed on persistence");
        }
        let body = ApiErrorResponse {
            error: self.code().to_ascii_uppercase(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
