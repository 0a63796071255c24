//! JSON-lines framing: one frame per line in each direction.

use serde::{Deserialize, Serialize};

use crate::domain::message::Message;

/// Room for the frame envelope around the message text.
const FRAME_OVERHEAD_BYTES: usize = 1024;
/// Worst case JSON encoding of one char (`\uXXXX`).
const MAX_ENCODED_CHAR_BYTES: usize = 6;

/// Longest client line accepted for a log that caps messages at
/// `max_message_chars`.
pub fn max_frame_bytes(max_message_chars: usize) -> usize {
    max_message_chars
        .saturating_mul(MAX_ENCODED_CHAR_BYTES)
        .saturating_add(FRAME_OVERHEAD_BYTES)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Hello {
        #[serde(default)]
        sender: String,
    },
    Send {
        text: String,
    },
    /// Marks everything up to `sequence` as read.
    Read {
        sequence: u64,
    },
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledMessage {
    #[serde(flatten)]
    pub message: Message,
    pub label: String,
}

impl LabelledMessage {
    pub fn for_viewer(message: Message, viewer: &str) -> Self {
        let label = message.display_sender(viewer).to_owned();
        Self { message, label }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Snapshot {
        messages: Vec<LabelledMessage>,
        #[serde(default)]
        unread: usize,
    },
    Message { message: LabelledMessage },
    Sent { sequence: u64 },
    Unread { unread: usize },
    Error { code: String, message: String },
}

impl ServerFrame {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

pub fn decode_client(line: &str) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_str(line.trim())
}

pub fn encode_server(frame: &ServerFrame) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}
