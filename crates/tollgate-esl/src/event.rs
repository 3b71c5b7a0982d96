//! ESL message parsing and representation
//!
//! Every message FreeSWITCH writes on the socket (auth requests, command
//! replies, api responses, events) is a block of `Key: Value` headers,
//! optionally followed by a `Content-Length` body.

use std::collections::HashMap;
use std::fmt;

use crate::constants;

/// A parsed ESL message
///
/// Header values are URL-decoded.
#[derive(Debug, Clone, Default)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    /// Create a new empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a message from raw text
    ///
    /// ```text
    /// Header-Name: value
    /// Another-Header: another value
    ///
    /// Optional body content
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut headers = HashMap::new();
        let mut body_lines = Vec::new();
        let mut in_body = false;

        for line in raw.lines() {
            if in_body {
                body_lines.push(line);
                continue;
            }

            if line.trim().is_empty() {
                in_body = true;
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                headers.insert(key.trim().to_string(), decoded);
            }
        }

        let body = (!body_lines.is_empty()).then(|| body_lines.join("\n"));
        Self { headers, body }
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    pub fn event_name(&self) -> Option<&str> {
        self.get_header("Event-Name")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length")
            .and_then(|s| s.parse().ok())
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.get_header("Reply-Text")
    }

    pub fn is_auth_request(&self) -> bool {
        self.content_type() == Some(constants::CONTENT_TYPE_AUTH)
    }

    pub fn is_command_reply(&self) -> bool {
        self.content_type() == Some(constants::CONTENT_TYPE_REPLY)
    }

    pub fn is_api_response(&self) -> bool {
        self.content_type() == Some(constants::CONTENT_TYPE_API)
    }

    /// Unsolicited event rather than a reply to something we sent
    pub fn is_event(&self) -> bool {
        matches!(
            self.content_type(),
            Some(constants::CONTENT_TYPE_EVENT) | Some(constants::CONTENT_TYPE_DISCONNECT)
        ) || self.event_name().is_some()
    }

    /// Result line: `Reply-Text` for command replies, the body for api responses
    pub fn result_text(&self) -> Option<&str> {
        if self.is_api_response() {
            self.body().map(str::trim)
        } else {
            self.reply_text()
        }
    }

    /// Check if the command was successful (starts with +OK)
    pub fn is_ok(&self) -> bool {
        self.result_text()
            .map(|t| t.starts_with("+OK"))
            .unwrap_or(false)
    }

    /// Check if the command failed (starts with -ERR)
    pub fn is_error(&self) -> bool {
        self.result_text()
            .map(|t| t.starts_with("-ERR"))
            .unwrap_or(false)
    }

    /// Message of a -ERR result
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        self.result_text()
            .map(|t| t.strip_prefix("-ERR").unwrap_or(t).trim().to_string())
    }
}

impl fmt::Display for EslEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EslEvent {{")?;

        if let Some(content_type) = self.content_type() {
            write!(f, " Content-Type: {}", content_type)?;
        }

        if let Some(result) = self.result_text() {
            write!(f, ", Result: {}", result)?;
        }

        write!(f, ", Headers: {} }}", self.headers.len())
    }
}
