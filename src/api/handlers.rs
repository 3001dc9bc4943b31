// src/api/handlers.rs
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;

use crate::error::DirectoryError;
use crate::models::{DirectoryRequest, DirectoryResponse, HealthResponse, StatusRequest, StatusResponse};
use crate::services::DirectoryService;

pub async fn health_check(directory: web::Data<Arc<DirectoryService>>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "pbx-directory".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ami_enabled: directory.ami_enabled(),
    })
}

/// Live statuses for a list of extension numbers.
/// Extensions without data are simply absent from `statuses`.
pub async fn extension_statuses(
    req: web::Json<StatusRequest>,
    directory: web::Data<Arc<DirectoryService>>,
) -> Result<HttpResponse, DirectoryError> {
    let statuses = directory.fetch_statuses(&req.extensions).await?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        success: true,
        statuses,
        last_updated: Utc::now(),
    }))
}

/// The caller's extension listing with a status on every entry
pub async fn extension_directory(
    req: web::Json<DirectoryRequest>,
    directory: web::Data<Arc<DirectoryService>>,
) -> Result<HttpResponse, DirectoryError> {
    let extensions = directory.fetch_directory(req.into_inner().extensions).await?;

    Ok(HttpResponse::Ok().json(DirectoryResponse {
        success: true,
        extensions,
        last_updated: Utc::now(),
    }))
}

/// Malformed JSON bodies answer in the same shape as other errors
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::warn!("Rejected request body: {}", err);
    DirectoryError::InvalidRequest(err.to_string()).into()
}
