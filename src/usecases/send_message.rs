//! Use case for posting a message to the log.
//!
//! Validation happens here, before the log is touched, so an empty message
//! never reaches storage.

use thiserror::Error;

use crate::{
    broker::{
        contracts::MessageLog,
        error::{InvalidMessageReason, StoreError},
    },
    domain::message::{normalize_sender, Message},
};

/// Command to post a message on behalf of `sender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageCommand {
    pub text: String,
    pub sender: String,
}

impl SendMessageCommand {
    pub fn new(text: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("message rejected: {0}")]
    InvalidMessage(InvalidMessageReason),
    #[error("message store unavailable: {details}")]
    StoreUnavailable { details: String },
}

impl SendMessageError {
    /// Stable code for transports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMessage(InvalidMessageReason::Empty) => "MESSAGE_EMPTY",
            Self::InvalidMessage(InvalidMessageReason::TooLong { .. }) => "MESSAGE_TOO_LONG",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
        }
    }
}

/// Appends the message to the log.
///
/// Trims the text and rejects it with `InvalidMessage` when nothing is left,
/// without calling the log. A blank sender is recorded as "Anonymous".
pub fn send_message(
    log: &dyn MessageLog,
    command: SendMessageCommand,
) -> Result<Message, SendMessageError> {
    let text = command.text.trim();
    if text.is_empty() {
        return Err(SendMessageError::InvalidMessage(InvalidMessageReason::Empty));
    }

    let sender = normalize_sender(&command.sender);
    log.append(text, &sender).map_err(map_store_error)
}

fn map_store_error(error: StoreError) -> SendMessageError {
    match error {
        StoreError::InvalidMessage(reason) => SendMessageError::InvalidMessage(reason),
        StoreError::Unavailable { details } => SendMessageError::StoreUnavailable { details },
    }
}
