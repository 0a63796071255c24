use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidMessageReason {
    #[error("message text is empty")]
    Empty,
    #[error("message text exceeds {limit} characters")]
    TooLong { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid message: {0}")]
    InvalidMessage(InvalidMessageReason),
    #[error("message store unavailable: {details}")]
    Unavailable { details: String },
}

impl StoreError {
    pub(crate) fn unavailable(details: impl Into<String>) -> Self {
        Self::Unavailable {
            details: details.into(),
        }
    }
}

/// Why the hub terminated a live stream. Yielded once, as the stream's last item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("subscriber fell behind; delivery queue of {capacity} messages is full")]
    Lagged { capacity: usize },
    #[error("message store unavailable while catching up: {details}")]
    StoreUnavailable { details: String },
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to open journal at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal at {path} is in use by another process")]
    Busy { path: PathBuf },
    #[error("failed to read journal at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal at {path} is corrupt at line {line}: {details}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        details: String,
    },
}
