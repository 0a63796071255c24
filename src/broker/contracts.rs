use crate::domain::message::Message;

use super::error::StoreError;

/// The ordered message log the hub and chat service are built on.
///
/// Implementations must hand out gap-free, strictly increasing sequences
/// starting at 1 and make an appended message visible to readers only once it
/// is fully committed.
pub trait MessageLog: Send + Sync {
    /// Validates and commits a new message, assigning its sequence and timestamp.
    fn append(&self, text: &str, sender: &str) -> Result<Message, StoreError>;

    /// Every committed message, in sequence order.
    fn snapshot(&self) -> Result<Vec<Message>, StoreError>;

    /// Committed messages with a sequence strictly greater than `sequence`.
    fn since(&self, sequence: u64) -> Result<Vec<Message>, StoreError>;
}

pub trait Clock: Send + Sync {
    fn now_unix_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
