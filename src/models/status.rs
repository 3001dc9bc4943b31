// src/models/status.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Live state of an extension as shown in the directory.
///
/// Derived from the numeric `Status` of an `ExtensionState` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusKind {
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "incall")]
    InCall,
    #[serde(rename = "busy")]
    Busy,
    #[serde(rename = "ringing")]
    Ringing,
    #[serde(rename = "incall_ringing")]
    InCallAndRinging,
    #[serde(rename = "hold")]
    OnHold,
    #[serde(rename = "unavailable")]
    Unregistered,
    #[serde(rename = "unknown")]
    #[default]
    Unknown,
}

impl StatusKind {
    /// Map an Asterisk extension state code. Total: every code maps somewhere.
    pub fn from_code(code: i32) -> Self {
        match code {
            c if c < 0 => StatusKind::Unregistered, // -1 not found, -2 removed
            0 => StatusKind::Available,
            1 => StatusKind::InCall,
            2 => StatusKind::Busy,
            4 => StatusKind::Unregistered,
            8 => StatusKind::Ringing,
            9 => StatusKind::InCallAndRinging,
            16 | 17 => StatusKind::OnHold,
            _ => StatusKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusKind::Available => "Available",
            StatusKind::InCall => "On Call",
            StatusKind::Busy => "Busy",
            StatusKind::Ringing => "Ringing",
            StatusKind::InCallAndRinging => "On Call (Ringing)",
            StatusKind::OnHold => "On Hold",
            StatusKind::Unregistered => "Not Registered",
            StatusKind::Unknown => "Unknown",
        }
    }
}

/// Decoded status of one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStatus {
    pub extension: String,
    pub code: i32,
    #[serde(rename = "status")]
    pub kind: StatusKind,
    #[serde(rename = "statusText")]
    pub text: String,
}

impl ExtensionStatus {
    /// Free text from the server, if any, replaces the default label.
    pub fn new(extension: &str, code: i32, status_text: Option<&str>) -> Self {
        let kind = StatusKind::from_code(code);
        let text = status_text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| kind.label().to_string());

        Self {
            extension: extension.to_string(),
            code,
            kind,
            text,
        }
    }
}

/// Extension -> status, only for extensions that answered in time
pub type SessionResult = HashMap<String, ExtensionStatus>;

static RE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*Status:[ \t]*(-?\d+)[ \t]*\r?$").unwrap());

static RE_STATUS_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*StatusText:[ \t]*([^\r\n]*?)[ \t]*\r?$").unwrap());

/// Pull `Status` and `StatusText` out of a reply body.
///
/// Field order does not matter and unrelated fields are ignored. Returns
/// `None` when there is no integer `Status` line.
pub fn parse_status_response(extension: &str, body: &str) -> Option<ExtensionStatus> {
    let code = RE_STATUS
        .captures(body)?
        .get(1)?
        .as_str()
        .parse::<i32>()
        .ok()?;

    let status_text = RE_STATUS_TEXT
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());

    Some(ExtensionStatus::new(extension, code, status_text))
}
