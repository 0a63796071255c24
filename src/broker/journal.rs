//! Append-only JSON-lines journal backing the message store.
//!
//! One committed message per line, in sequence order. The file is held under
//! an exclusive advisory lock for as long as the journal is open so two
//! processes never interleave appends.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::domain::message::Message;

use super::error::JournalError;

const JOURNAL_TORN_TAIL_TRUNCATED: &str = "JOURNAL_TORN_TAIL_TRUNCATED";
const JOURNAL_ROLLBACK_FAILED: &str = "JOURNAL_ROLLBACK_FAILED";

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    len: u64,
    fsync: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct Replay {
    messages: Vec<Message>,
    valid_len: u64,
    torn_tail: bool,
    missing_newline: bool,
}

impl Journal {
    /// Opens (or creates) the journal, locks it and replays its contents.
    pub fn open(path: &Path, fsync: bool) -> Result<(Self, Vec<Message>), JournalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| JournalError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|source| JournalError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        file.try_lock_exclusive().map_err(|source| {
            if source.kind() == fs2::lock_contended_error().kind() {
                JournalError::Busy {
                    path: path.to_path_buf(),
                }
            } else {
                JournalError::Open {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let raw = read_raw(path)?;
        let replay = parse_entries(path, &raw)?;

        if replay.torn_tail {
            tracing::warn!(
                code = JOURNAL_TORN_TAIL_TRUNCATED,
                path = %path.display(),
                valid_len = replay.valid_len,
                "journal ended with a partial entry; truncating it"
            );
            file.set_len(replay.valid_len)
                .map_err(|source| JournalError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        let mut len = replay.valid_len;
        if replay.missing_newline {
            file.write_all(b"\n").map_err(|source| JournalError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            len += 1;
        }

        tracing::info!(
            path = %path.display(),
            messages = replay.messages.len(),
            "journal opened"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len,
                fsync,
            },
            replay.messages,
        ))
    }

    /// Reads the journal without locking it. A missing file is an empty log.
    pub fn read_all(path: &Path) -> Result<Vec<Message>, JournalError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = read_raw(path)?;
        Ok(parse_entries(path, &raw)?.messages)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one entry. On failure the file is cut back to its previous
    /// length so a later replay never sees a partial line.
    pub fn append(&mut self, message: &Message) -> io::Result<()> {
        let mut line = serde_json::to_vec(message).map_err(io::Error::other)?;
        line.push(b'\n');

        if let Err(error) = self.write_line(&line) {
            if let Err(rollback) = self.file.set_len(self.len) {
                tracing::error!(
                    code = JOURNAL_ROLLBACK_FAILED,
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back journal after write error"
                );
            }
            return Err(error);
        }

        self.len += line.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        if self.fsync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_raw(path: &Path) -> Result<Vec<u8>, JournalError> {
    fs::read(path).map_err(|source| JournalError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_entries(path: &Path, raw: &[u8]) -> Result<Replay, JournalError> {
    let mut messages: Vec<Message> = Vec::new();
    let mut offset = 0usize;
    let mut line_number = 0usize;

    while offset < raw.len() {
        line_number += 1;
        let rest = &raw[offset..];
        let (line, consumed, terminated) = match rest.iter().position(|&byte| byte == b'\n') {
            Some(end) => (&rest[..end], end + 1, true),
            None => (rest, rest.len(), false),
        };

        let torn = Replay {
            messages: Vec::new(),
            valid_len: offset as u64,
            torn_tail: true,
            missing_newline: false,
        };

        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(_) if !terminated => return Ok(Replay { messages, ..torn }),
            Err(error) => {
                return Err(JournalError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_number,
                    details: format!("invalid UTF-8: {error}"),
                });
            }
        };

        if line.trim().is_empty() {
            offset += consumed;
            continue;
        }

        let message = match serde_json::from_str::<Message>(line) {
            Ok(message) => message,
            Err(_) if !terminated => return Ok(Replay { messages, ..torn }),
            Err(error) => {
                return Err(JournalError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_number,
                    details: error.to_string(),
                });
            }
        };

        let expected = messages.len() as u64 + 1;
        if message.sequence != expected {
            return Err(JournalError::Corrupt {
                path: path.to_path_buf(),
                line: line_number,
                details: format!("expected sequence {expected}, found {}", message.sequence),
            });
        }

        messages.push(message);
        offset += consumed;

        if !terminated {
            return Ok(Replay {
                messages,
                valid_len: offset as u64,
                torn_tail: false,
                missing_newline: true,
            });
        }
    }

    Ok(Replay {
        messages,
        valid_len: offset as u64,
        torn_tail: false,
        missing_newline: false,
    })
}
