use serde::{Deserialize, Serialize};

/// Sender recorded when the identity collaborator supplies nothing usable.
pub const ANONYMOUS_SENDER: &str = "Anonymous";

/// Label shown instead of the sender name for the viewer's own messages.
pub const OWN_MESSAGE_LABEL: &str = "You";

/// A committed chat message. Never mutated after the store assigns its
/// `sequence` and `timestamp_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sequence: u64,
    pub timestamp_ms: i64,
    pub sender: String,
    pub text: String,
}

impl Message {
    /// Presentation order key. Timestamps may collide, sequence never does.
    pub fn order_key(&self) -> (i64, u64) {
        (self.timestamp_ms, self.sequence)
    }

    pub fn is_from(&self, viewer: &str) -> bool {
        self.sender == normalize_sender(viewer)
    }

    /// Returns "You" for the viewer's own messages, the sender otherwise.
    pub fn display_sender<'a>(&'a self, viewer: &str) -> &'a str {
        if self.is_from(viewer) {
            OWN_MESSAGE_LABEL
        } else {
            &self.sender
        }
    }
}

/// Trims the supplied identifier and substitutes [`ANONYMOUS_SENDER`] when
/// nothing remains.
pub fn normalize_sender(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        ANONYMOUS_SENDER.to_owned()
    } else {
        trimmed.to_owned()
    }
}
