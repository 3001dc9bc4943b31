// src/ami/message.rs
use std::collections::HashMap;

use crate::ami::codec::Action;

/// Marker a successful `Login` reply carries somewhere in its text
pub const SUCCESS_MARKER: &str = "Success";

/// One decoded AMI block (a reply or an unsolicited event).
///
/// Header keys are matched case-insensitively; when a key repeats, the last
/// value wins. The raw text is kept for pattern-based field extraction.
#[derive(Debug, Clone, Default)]
pub struct AmiMessage {
    raw: String,
    headers: HashMap<String, String>,
}

impl AmiMessage {
    pub fn parse(raw: &str) -> Self {
        let mut headers = HashMap::new();

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                headers.insert(key.to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Self {
            raw: raw.to_string(),
            headers,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn response(&self) -> Option<&str> {
        self.get_header("Response")
    }

    pub fn event(&self) -> Option<&str> {
        self.get_header("Event")
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get_header("ActionID")
    }

    pub fn is_event(&self) -> bool {
        self.event().is_some()
    }

    pub fn is_success(&self) -> bool {
        self.raw.contains(SUCCESS_MARKER)
    }

    /// Whether this block is the reply to `action`.
    ///
    /// Events never are. A reply without an `ActionID` is accepted, since
    /// some servers drop it on error replies, unless `action` targets an
    /// `Exten` the reply does not echo back.
    pub fn answers(&self, action: &Action) -> bool {
        if self.is_event() || self.is_empty() {
            return false;
        }
        match self.action_id() {
            Some(id) => id == action.action_id(),
            None => match action.get_field("Exten") {
                Some(exten) => self.get_header("Exten") == Some(exten),
                None => true,
            },
        }
    }
}
