use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    broker::{contracts::MessageLog, error::StoreError, hub::SubscriptionHub},
    domain::{message::Message, read_state::ReadState, summary::ChatSummary},
};

use super::{
    open_stream::{open_stream, OpenStreamError, OpenedStream},
    send_message::{send_message, SendMessageCommand, SendMessageError},
};

/// Entry point for every client of the chat: sends go into the log and are
/// announced to the hub, streams are opened through the hub.
///
/// Read cursors live in memory for the lifetime of the service.
#[derive(Clone)]
pub struct ChatService {
    log: Arc<dyn MessageLog>,
    hub: Arc<SubscriptionHub>,
    reads: Arc<Mutex<ReadState>>,
}

impl ChatService {
    pub fn new(log: Arc<dyn MessageLog>, hub: Arc<SubscriptionHub>) -> Self {
        Self {
            log,
            hub,
            reads: Arc::new(Mutex::new(ReadState::default())),
        }
    }

    /// Builds the hub over `log` with the given per-subscriber queue size.
    pub fn over(log: Arc<dyn MessageLog>, channel_capacity: usize) -> Self {
        let hub = Arc::new(SubscriptionHub::new(Arc::clone(&log), channel_capacity));
        Self::new(log, hub)
    }

    pub fn send_message(&self, text: &str, sender: &str) -> Result<Message, SendMessageError> {
        let message = send_message(self.log.as_ref(), SendMessageCommand::new(text, sender))?;
        self.hub.notify(&message);
        Ok(message)
    }

    /// Opens the viewer's stream. `unread` counts the initial messages from
    /// others past the viewer's read cursor; opening does not mark them read.
    pub fn open_stream(&self, sender: &str) -> Result<OpenedStream, OpenStreamError> {
        let mut opened = open_stream(&self.hub, sender)?;
        opened.unread = self
            .reads()?
            .unread_count(&opened.initial, opened.viewer());
        Ok(opened)
    }

    /// Marks everything up to `sequence` as read for `viewer`. Sequences past
    /// the end of the log are clamped to the last committed message. Returns
    /// the viewer's remaining unread count.
    pub fn mark_read(&self, viewer: &str, sequence: u64) -> Result<usize, StoreError> {
        let messages = self.log.snapshot()?;
        let last = messages.last().map_or(0, |message| message.sequence);

        let mut reads = self.reads()?;
        let cursor = reads.mark_read(viewer, sequence.min(last));
        tracing::debug!(viewer = %viewer.trim(), cursor, "read cursor moved");

        Ok(reads.unread_count(&messages, viewer))
    }

    pub fn snapshot(&self) -> Result<Vec<Message>, StoreError> {
        self.log.snapshot()
    }

    pub fn summary(&self) -> Result<ChatSummary, StoreError> {
        let messages = self.log.snapshot()?;
        Ok(ChatSummary::with_read_state(&messages, &*self.reads()?))
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn reads(&self) -> Result<MutexGuard<'_, ReadState>, StoreError> {
        self.reads
            .lock()
            .map_err(|_| StoreError::unavailable("read state lock poisoned"))
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("subscribers", &self.hub.subscriber_count())
            .finish()
    }
}
