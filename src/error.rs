// src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
///
/// Status polling failures are not among them: they degrade to missing or
/// `unknown` statuses instead.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Too many extensions in one request: {count} (max {max})")]
    TooManyExtensions { count: usize, max: usize },
}

impl ResponseError for DirectoryError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": self.error_code(),
            "message": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DirectoryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DirectoryError::TooManyExtensions { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl DirectoryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::InvalidRequest(_) => "invalid_request",
            DirectoryError::TooManyExtensions { .. } => "invalid_request",
        }
    }
}
