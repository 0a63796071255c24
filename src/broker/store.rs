use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::message::{normalize_sender, Message};

use super::{
    contracts::{Clock, MessageLog, SystemClock},
    error::{InvalidMessageReason, StoreError},
    journal::Journal,
};

const STORE_APPEND_FAILED: &str = "STORE_APPEND_FAILED";

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4096;

/// Append-only message log. All mutation goes through [`MessageLog::append`]
/// under the write lock; reads share the read lock.
pub struct MessageStore {
    state: RwLock<StoreState>,
    clock: Box<dyn Clock>,
    max_message_chars: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    messages: Vec<Message>,
    journal: Option<Journal>,
}

impl MessageStore {
    /// A store that lives for the process lifetime only.
    pub fn in_memory() -> Self {
        Self::from_state(StoreState::default())
    }

    /// A store backed by an opened journal and the messages it replayed.
    pub fn journaled(journal: Journal, replayed: Vec<Message>) -> Self {
        Self::from_state(StoreState {
            messages: replayed,
            journal: Some(journal),
        })
    }

    fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
            clock: Box::new(SystemClock),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_max_message_chars(mut self, limit: usize) -> Self {
        self.max_message_chars = limit;
        self
    }

    pub fn len(&self) -> usize {
        self.read().map(|state| state.messages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::unavailable("message log lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::unavailable("message log lock poisoned"))
    }

    fn validate<'a>(&self, text: &'a str) -> Result<&'a str, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::InvalidMessage(InvalidMessageReason::Empty));
        }

        if text.chars().count() > self.max_message_chars {
            return Err(StoreError::InvalidMessage(InvalidMessageReason::TooLong {
                limit: self.max_message_chars,
            }));
        }

        Ok(text)
    }
}

impl MessageLog for MessageStore {
    fn append(&self, text: &str, sender: &str) -> Result<Message, StoreError> {
        let text = self.validate(text)?;
        let sender = normalize_sender(sender);

        let mut state = self.write()?;
        let previous = state.messages.last();
        let sequence = previous.map_or(0, |message| message.sequence) + 1;
        let now = self.clock.now_unix_ms();
        let timestamp_ms = previous.map_or(now, |message| message.timestamp_ms.max(now));

        let message = Message {
            sequence,
            timestamp_ms,
            sender,
            text: text.to_owned(),
        };

        if let Some(journal) = state.journal.as_mut() {
            journal.append(&message).map_err(|error| {
                tracing::error!(
                    code = STORE_APPEND_FAILED,
                    sequence,
                    error = %error,
                    "journal write failed; message not committed"
                );
                StoreError::unavailable(format!("journal write failed: {error}"))
            })?;
        }

        state.messages.push(message.clone());
        tracing::debug!(sequence, sender = %message.sender, "message appended");

        Ok(message)
    }

    fn snapshot(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.read()?.messages.clone())
    }

    fn since(&self, sequence: u64) -> Result<Vec<Message>, StoreError> {
        let state = self.read()?;
        // Sequences are contiguous from 1, so sequence N sits at index N - 1.
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(state.messages.len());

        Ok(state.messages[start..].to_vec())
    }
}
