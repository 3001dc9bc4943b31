// src/models/mod.rs
pub mod extension;
pub mod status;

pub use extension::{attach_statuses, Extension, ExtensionWithStatus};
pub use status::{parse_status_response, ExtensionStatus, SessionResult, StatusKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==================== API DTOs ====================

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub statuses: SessionResult,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryRequest {
    #[serde(default)]
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryResponse {
    pub success: bool,
    pub extensions: Vec<ExtensionWithStatus>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub ami_enabled: bool,
}
