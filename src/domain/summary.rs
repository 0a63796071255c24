use std::collections::BTreeMap;

use super::{
    message::{normalize_sender, Message},
    read_state::ReadState,
};

/// Chat-list style overview of the log: how many messages exist, which one
/// came last and how many each known participant has not read yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSummary {
    pub message_count: usize,
    pub last_message: Option<Message>,
    unread: BTreeMap<String, usize>,
}

impl ChatSummary {
    pub fn from_messages(messages: &[Message]) -> Self {
        Self::with_read_state(messages, &ReadState::default())
    }

    /// Summary with unread counts for every sender and every viewer that has
    /// a read cursor.
    pub fn with_read_state(messages: &[Message], reads: &ReadState) -> Self {
        let mut unread = BTreeMap::new();
        let participants = messages
            .iter()
            .map(|message| message.sender.as_str())
            .chain(reads.viewers());
        for viewer in participants {
            if !unread.contains_key(viewer) {
                unread.insert(viewer.to_owned(), reads.unread_count(messages, viewer));
            }
        }

        Self {
            message_count: messages.len(),
            last_message: messages.last().cloned(),
            unread,
        }
    }

    /// Unread messages for `viewer`. Someone who has neither sent nor read
    /// anything has every message unread.
    pub fn unread_for(&self, viewer: &str) -> usize {
        self.unread
            .get(&normalize_sender(viewer))
            .copied()
            .unwrap_or(self.message_count)
    }

    pub fn last_message_preview(&self) -> Option<&str> {
        self.last_message.as_ref().map(|message| message.text.as_str())
    }

    pub fn last_message_unix_ms(&self) -> Option<i64> {
        self.last_message.as_ref().map(|message| message.timestamp_ms)
    }
}
