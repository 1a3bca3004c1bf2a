//! API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flagship_core::FlagshipError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid API key
    Unauthorized(String),
    /// Malformed request
    BadRequest(String),
    /// Flag does not exist
    NotFound(String),
    /// Internal server error
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Error response body: `{ "error": <code>, "message": <text> }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: Some(self.message().to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<FlagshipError> for ApiError {
    fn from(err: FlagshipError) -> Self {
        match err {
            FlagshipError::Unauthorized => {
                ApiError::Unauthorized("Invalid or missing API key".to_string())
            }
            FlagshipError::NotFound { .. } => ApiError::NotFound("Flag not found".to_string()),
            FlagshipError::InvalidInput(msg) => ApiError::BadRequest(msg),
            _ => ApiError::Internal("Internal server error".to_string()),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_the_wire_contract() {
        assert_eq!(
            ApiError::Unauthorized(String::new()).error_code(),
            "unauthorized"
        );
        assert_eq!(ApiError::BadRequest(String::new()).error_code(), "bad_request");
        assert_eq!(ApiError::NotFound(String::new()).error_code(), "not_found");
        assert_eq!(
            ApiError::Internal(String::new()).error_code(),
            "internal_error"
        );
    }

    #[test]
    fn domain_errors_map_to_the_right_status() {
        let unauthorized: ApiError = FlagshipError::Unauthorized.into();
        assert_eq!(unauthorized.status_code(), StatusCode::UNAUTHORIZED);

        let not_found: ApiError = FlagshipError::not_found("flag", "ghost").into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let internal: ApiError = FlagshipError::dependency("db down").into();
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let parse: ApiError = FlagshipError::parse("bad bool").into();
        assert_eq!(parse.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
