// src/ami/codec.rs
//! Wire framing for the Asterisk Manager Interface.
//!
//! AMI has no length prefix: every command and every reply is a block of
//! `Key: value` lines closed by an empty line (`\r\n\r\n`). The only exception
//! is the greeting banner, a single `\r\n`-terminated line sent on connect.

use bytes::BytesMut;
use std::fmt;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Block terminator (an empty line)
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Line terminator
pub const LINE_END: &[u8] = b"\r\n";

/// Upper bound for a single buffered block or banner line
pub const MAX_BLOCK_LEN: usize = 64 * 1024;

/// One outgoing AMI action.
///
/// Fields are written in insertion order after `Action` and `ActionID`.
#[derive(Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    action_id: String,
    fields: Vec<(String, String)>,
}

impl Action {
    pub fn new(name: &str, action_id: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            action_id: action_id.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// `Login` with event delivery switched off for this session
    pub fn login(action_id: impl Into<String>, username: &str, secret: &str) -> Self {
        Self::new("Login", action_id)
            .field("Username", username)
            .field("Secret", secret)
            .field("Events", "off")
    }

    pub fn extension_state(action_id: impl Into<String>, exten: &str, context: &str) -> Self {
        Self::new("ExtensionState", action_id)
            .field("Exten", exten)
            .field("Context", context)
    }

    pub fn logoff(action_id: impl Into<String>) -> Self {
        Self::new("Logoff", action_id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize as a terminated AMI block
    pub fn to_wire(&self) -> String {
        let mut out = format!("Action: {}\r\nActionID: {}\r\n", self.name, self.action_id);
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

// Credentials must never end up in logs through `{:?}`.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("Secret") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();

        f.debug_struct("Action")
            .field("name", &self.name)
            .field("action_id", &self.action_id)
            .field("fields", &fields)
            .finish()
    }
}

/// Splits the inbound byte stream into reply blocks and encodes actions.
///
/// Bytes following a terminator stay in the buffer for the next call, so a
/// single read may carry several replies, or only part of one.
#[derive(Debug, Default)]
pub struct AmiCodec {
    // Bytes of the current buffer already searched without a match
    scanned: usize,
}

impl AmiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next `\r\n`-terminated line (the banner) off the buffer.
    pub fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match find(src, LINE_END, 0) {
            Some(pos) => {
                let line = src.split_to(pos + LINE_END.len());
                self.scanned = 0;
                Ok(Some(
                    String::from_utf8_lossy(&line[..pos]).trim().to_string(),
                ))
            }
            None => check_len(src).map(|_| None),
        }
    }
}

impl Decoder for AmiCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The terminator may straddle the previous and the current read
        let from = self.scanned.saturating_sub(TERMINATOR.len() - 1);

        match find(src, TERMINATOR, from) {
            Some(pos) => {
                let block = src.split_to(pos + TERMINATOR.len());
                self.scanned = 0;
                Ok(Some(String::from_utf8_lossy(&block[..pos]).into_owned()))
            }
            None => {
                check_len(src)?;
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

impl<'a> Encoder<&'a Action> for AmiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &'a Action, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.to_wire().as_bytes());
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn check_len(src: &BytesMut) -> Result<(), io::Error> {
    if src.len() > MAX_BLOCK_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("AMI block exceeds {} bytes without terminator", MAX_BLOCK_LEN),
        ));
    }
    Ok(())
}
