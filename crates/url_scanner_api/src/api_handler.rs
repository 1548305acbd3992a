//! Shared API types and utilities
//!
//! This module contains the request body, the error envelope and the mapping
//! from core scan errors to HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use url_scan_core::ScanError;
use uuid::Uuid;

/// Request body for `POST /api/scan`
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequestBody {
    /// URL or bare host name to scan
    #[serde(default)]
    pub url: Option<String>,
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub request_id: String,
    pub timestamp: String,
}

/// Result type for API handlers
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// User-correctable input problem
    InvalidInput(String),
    /// Missing operator configuration
    Configuration(String),
    /// The reputation service failed or timed out
    Upstream(String),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(_) | ApiError::Upstream(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn parts(self) -> (&'static str, String) {
        match self {
            ApiError::InvalidInput(msg) => ("INVALID_INPUT", msg),
            ApiError::Configuration(msg) => ("CONFIGURATION_ERROR", msg),
            ApiError::Upstream(msg) => ("UPSTREAM_ERROR", msg),
            ApiError::InternalError(msg) => ("INTERNAL_ERROR", msg),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Validation(msg) => ApiError::InvalidInput(msg),
            ScanError::Configuration(msg) => ApiError::Configuration(msg),
            ScanError::Upstream(msg) | ScanError::Timeout(msg) => ApiError::Upstream(msg),
            ScanError::Internal(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = self.parts();

        if status.is_server_error() {
            error!("Request failed ({}): {}", error_code, message);
        } else {
            warn!("Request rejected ({}): {}", error_code, message);
        }

        let message = if message.is_empty() {
            "Internal server error".to_string()
        } else {
            message
        };

        let error_response = ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}
