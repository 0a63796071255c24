use std::collections::BTreeMap;

use super::message::{normalize_sender, Message};

/// How far each viewer has read. Cursors only move forward and never touch
/// the messages themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadState {
    cursors: BTreeMap<String, u64>,
}

impl ReadState {
    /// Last sequence `viewer` has read, 0 when nothing has been read.
    pub fn cursor(&self, viewer: &str) -> u64 {
        self.cursors
            .get(&normalize_sender(viewer))
            .copied()
            .unwrap_or(0)
    }

    /// Moves the viewer's cursor to `sequence` unless it is already past it.
    /// Returns the resulting cursor.
    pub fn mark_read(&mut self, viewer: &str, sequence: u64) -> u64 {
        let cursor = self.cursors.entry(normalize_sender(viewer)).or_insert(0);
        *cursor = (*cursor).max(sequence);
        *cursor
    }

    /// Messages from other senders after the viewer's cursor.
    pub fn unread_count(&self, messages: &[Message], viewer: &str) -> usize {
        let cursor = self.cursor(viewer);
        messages
            .iter()
            .filter(|message| message.sequence > cursor && !message.is_from(viewer))
            .count()
    }

    pub fn viewers(&self) -> impl Iterator<Item = &str> {
        self.cursors.keys().map(String::as_str)
    }
}
