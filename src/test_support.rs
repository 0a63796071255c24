use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use crate::{
    broker::{
        contracts::{Clock, MessageLog},
        error::StoreError,
    },
    domain::message::Message,
};

pub fn message(sequence: u64, timestamp_ms: i64, sender: &str, text: &str) -> Message {
    Message {
        sequence,
        timestamp_ms,
        sender: sender.to_owned(),
        text: text.to_owned(),
    }
}

/// Clock pinned to a settable instant; clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Log whose storage is down. Optionally serves an empty snapshot so a
/// subscription can be opened before reads start failing.
#[derive(Debug, Default)]
pub struct FailingLog {
    empty_snapshot: bool,
}

impl FailingLog {
    pub fn with_empty_snapshot() -> Self {
        Self {
            empty_snapshot: true,
        }
    }
}

impl MessageLog for FailingLog {
    fn append(&self, _text: &str, _sender: &str) -> Result<Message, StoreError> {
        Err(StoreError::unavailable("disk unplugged"))
    }

    fn snapshot(&self) -> Result<Vec<Message>, StoreError> {
        if self.empty_snapshot {
            Ok(Vec::new())
        } else {
            Err(StoreError::unavailable("disk unplugged"))
        }
    }

    fn since(&self, _sequence: u64) -> Result<Vec<Message>, StoreError> {
        Err(StoreError::unavailable("disk unplugged"))
    }
}
