// src/models/extension.rs
use serde::{Deserialize, Serialize};

use super::status::{SessionResult, StatusKind};

/// One directory entry as delivered by the PBX extension listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voicemail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outboundcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sipname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionWithStatus {
    #[serde(flatten)]
    pub extension: Extension,
    pub status: StatusKind,
    pub status_text: String,
}

/// Join a listing with polled statuses, keeping listing order.
///
/// Extensions the poll has no data for get `unknown` / "Unknown".
pub fn attach_statuses(extensions: Vec<Extension>, statuses: &SessionResult) -> Vec<ExtensionWithStatus> {
    extensions
        .into_iter()
        .map(|ext| {
            let (status, status_text) = match statuses.get(ext.extension.trim()) {
                Some(found) => (found.kind, found.text.clone()),
                None => (StatusKind::Unknown, StatusKind::Unknown.label().to_string()),
            };
            ExtensionWithStatus {
                extension: ext,
                status,
                status_text,
            }
        })
        .collect()
}
