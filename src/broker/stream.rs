use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use tokio::sync::mpsc;

use crate::domain::message::Message;

use super::{
    error::StreamError,
    hub::{Registry, SubscriberId},
};

/// Live tail of a subscription.
///
/// Yields every message committed after the subscription's snapshot, in
/// sequence order. When the hub terminates the subscriber the stream yields
/// the reason once as `Err` and then ends. Dropping the stream unsubscribes.
pub struct MessageStream {
    id: SubscriberId,
    rx: mpsc::Receiver<Message>,
    fault: Arc<OnceLock<StreamError>>,
    registry: Weak<std::sync::Mutex<Registry>>,
    finished: bool,
}

impl MessageStream {
    pub(super) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Message>,
        fault: Arc<OnceLock<StreamError>>,
        registry: Weak<std::sync::Mutex<Registry>>,
    ) -> Self {
        Self {
            id,
            rx,
            fault,
            registry,
            finished: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next message. Returns `None` once the stream is
    /// cancelled or the hub has gone away.
    pub async fn next(&mut self) -> Option<Result<Message, StreamError>> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(message) => Some(Ok(message)),
            None => self.finish(),
        }
    }

    /// Blocking variant of [`MessageStream::next`] for callers outside an
    /// async runtime.
    pub fn blocking_next(&mut self) -> Option<Result<Message, StreamError>> {
        if self.finished {
            return None;
        }

        match self.rx.blocking_recv() {
            Some(message) => Some(Ok(message)),
            None => self.finish(),
        }
    }

    /// Stops the stream immediately. Queued messages are discarded.
    pub fn cancel(&mut self) {
        if self.finished {
            return;
        }

        self.finished = true;
        self.rx.close();
        self.detach();
        tracing::debug!(subscriber = %self.id, "stream cancelled");
    }

    fn finish(&mut self) -> Option<Result<Message, StreamError>> {
        self.finished = true;
        self.fault.get().cloned().map(Err)
    }

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.lock() {
                registry.remove(self.id);
            }
        }
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.detach();
    }
}
