//! Wire message construction and parsing for the read-aloud protocol.
//!
//! # Outbound text message
//!
//! ```text
//! X-RequestId:<id>\r\n
//! X-Timestamp:<iso-8601>\r\n
//! Content-Type:<type>\r\n
//! Path:<path>\r\n
//! \r\n
//! <body>
//! ```
//!
//! # Inbound binary message
//!
//! ```text
//! ┌────────────┬──────────────────────────┬───────────────┐
//! │ u16 BE len │ header block (len bytes) │ audio payload │
//! └────────────┴──────────────────────────┴───────────────┘
//! ```

use std::collections::HashMap;

use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::transport::TextFragment;
use crate::core::tts::base::{OutputFormat, ProtocolViolation};

pub const PATH_SPEECH_CONFIG: &str = "speech.config";
pub const PATH_SSML: &str = "ssml";
pub const PATH_AUDIO: &str = "audio";
pub const PATH_TURN_START: &str = "turn.start";
pub const PATH_TURN_END: &str = "turn.end";

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
const CONTENT_TYPE_SSML: &str = "application/ssml+xml";

// =============================================================================
// Request Correlation
// =============================================================================

/// Identifies one protocol attempt. Never reused across retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCorrelation {
    pub request_id: String,
    pub timestamp: String,
}

impl RequestCorrelation {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().simple().to_string(),
            timestamp: iso_timestamp(OffsetDateTime::now_utc()),
        }
    }
}

impl Default for RequestCorrelation {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats `at` as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn iso_timestamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.millisecond()
    )
}

// =============================================================================
// Outbound Messages
// =============================================================================

fn header_block(correlation: &RequestCorrelation, content_type: &str, path: &str) -> String {
    let mut s = String::with_capacity(160);
    s.push_str("X-RequestId:");
    s.push_str(&correlation.request_id);
    s.push_str("\r\nX-Timestamp:");
    s.push_str(&correlation.timestamp);
    s.push_str("\r\nContent-Type:");
    s.push_str(content_type);
    s.push_str("\r\nPath:");
    s.push_str(path);
    s.push_str("\r\n\r\n");
    s
}

/// Builds the `speech.config` message declaring the output encoding.
///
/// Sentence and word boundary metadata are disabled; only audio is wanted.
pub fn build_config_message(correlation: &RequestCorrelation, format: OutputFormat) -> String {
    let body = json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "false"
                    },
                    "outputFormat": format.as_str()
                }
            }
        }
    });

    let mut message = header_block(correlation, CONTENT_TYPE_JSON, PATH_SPEECH_CONFIG);
    message.push_str(&body.to_string());
    message
}

/// Builds the `ssml` content message around an already-rendered SSML document.
pub fn build_ssml_message(correlation: &RequestCorrelation, ssml: &str) -> String {
    let mut message = header_block(correlation, CONTENT_TYPE_SSML, PATH_SSML);
    message.push_str(ssml);
    message
}

/// Splits a logical text message into frames of at most `chunk_size` bytes.
///
/// Splits land on UTF-8 character boundaries. Only the last fragment has `fin`.
pub fn split_message(message: &str, chunk_size: usize) -> Vec<TextFragment> {
    let chunk_size = chunk_size.max(4);
    if message.len() <= chunk_size {
        return vec![TextFragment::whole(message)];
    }

    let mut fragments = Vec::with_capacity(message.len() / chunk_size + 1);
    let mut rest = message;
    while !rest.is_empty() {
        let mut end = chunk_size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        fragments.push(TextFragment {
            data: head.to_string(),
            continuation: !fragments.is_empty(),
            fin: tail.is_empty(),
        });
        rest = tail;
    }
    fragments
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Parses a `Name:value` header block, ignoring malformed lines.
pub fn parse_headers(block: &str) -> HashMap<&str, &str> {
    block
        .split("\r\n")
        .flat_map(|line| line.split('\n'))
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim(), value.trim()))
        })
        .collect()
}

/// Splits an inbound text message into its header block and body.
pub fn split_text_message(message: &str) -> (&str, &str) {
    match message.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body),
        None => (message, ""),
    }
}

/// Returns the `Path` header of an inbound text message.
pub fn text_message_path(message: &str) -> Option<&str> {
    let (head, _) = split_text_message(message);
    parse_headers(head).get("Path").copied()
}

/// A decoded binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub header: &'a str,
    pub payload: &'a [u8],
}

impl BinaryFrame<'_> {
    pub fn path(&self) -> Option<&str> {
        parse_headers(self.header).get("Path").copied()
    }

    #[inline]
    pub fn is_audio(&self) -> bool {
        self.path() == Some(PATH_AUDIO)
    }
}

/// Decodes the length-prefixed header of a binary frame.
pub fn parse_binary_frame(data: &[u8]) -> Result<BinaryFrame<'_>, ProtocolViolation> {
    if data.len() < 2 {
        return Err(ProtocolViolation::MalformedFrame(format!(
            "frame of {} bytes has no header length",
            data.len()
        )));
    }

    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let header_end = 2 + header_len;
    if data.len() < header_end {
        return Err(ProtocolViolation::MalformedFrame(format!(
            "declared header of {header_len} bytes but frame holds {}",
            data.len() - 2
        )));
    }

    let header = std::str::from_utf8(&data[2..header_end]).map_err(|e| {
        ProtocolViolation::MalformedFrame(format!("header is not valid UTF-8: {e}"))
    })?;

    Ok(BinaryFrame {
        header,
        payload: &data[header_end..],
    })
}

#[cfg(test)]
pub(crate) fn encode_binary_frame(header: &str, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + header.len() + payload.len());
    frame.extend_from_slice(&(header.len() as u16).to_be_bytes());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    frame
}
