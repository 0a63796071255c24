use thiserror::Error;

use crate::{
    broker::{
        error::StoreError,
        hub::{Subscription, SubscriptionHub},
        stream::MessageStream,
    },
    domain::message::{normalize_sender, Message},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenStreamError {
    #[error("message store unavailable: {details}")]
    StoreUnavailable { details: String },
}

impl From<StoreError> for OpenStreamError {
    fn from(error: StoreError) -> Self {
        Self::StoreUnavailable {
            details: error.to_string(),
        }
    }
}

/// A viewer's window onto the log: everything so far, then live updates.
#[derive(Debug)]
pub struct OpenedStream {
    viewer: String,
    pub initial: Vec<Message>,
    /// Messages in `initial` from others that the viewer has not read.
    pub unread: usize,
    pub live: MessageStream,
}

impl OpenedStream {
    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Sender label for rendering: "You" for the viewer's own messages.
    pub fn display_sender<'a>(&self, message: &'a Message) -> &'a str {
        message.display_sender(&self.viewer)
    }
}

pub fn open_stream(hub: &SubscriptionHub, sender: &str) -> Result<OpenedStream, OpenStreamError> {
    let viewer = normalize_sender(sender);
    let Subscription { snapshot, stream } = hub.subscribe()?;

    tracing::debug!(
        viewer = %viewer,
        subscriber = %stream.id(),
        initial = snapshot.len(),
        "stream opened"
    );

    Ok(OpenedStream {
        viewer,
        initial: snapshot,
        unread: 0,
        live: stream,
    })
}
