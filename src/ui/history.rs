//! Plain-text rendering of the message log for the `history` command.
//!
//! Each message becomes `HH:MM sender: text` in local time, with a date
//! separator line whenever the day changes.

use chrono::{Local, TimeZone};

use crate::domain::{message::Message, summary::ChatSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLine {
    /// Date separator line (e.g., "--- 14 Feb 2026 ---").
    DateSeparator(String),
    Message {
        time: String,
        sender: String,
        text: String,
    },
}

impl std::fmt::Display for HistoryLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DateSeparator(date) => write!(f, "--- {date} ---"),
            Self::Message { time, sender, text } => write!(f, "{time} {sender}: {text}"),
        }
    }
}

/// Builds the lines for the last `limit` messages (all of them when `None`),
/// labelling the viewer's own messages "You".
pub fn build_history_lines(
    messages: &[Message],
    viewer: &str,
    limit: Option<usize>,
) -> Vec<HistoryLine> {
    let start = limit.map_or(0, |limit| messages.len().saturating_sub(limit));
    let mut lines = Vec::new();
    let mut prev_date: Option<chrono::NaiveDate> = None;

    for message in &messages[start..] {
        let date = timestamp_to_date(message.timestamp_ms);
        if prev_date != Some(date) {
            lines.push(HistoryLine::DateSeparator(format_date(date)));
        }

        lines.push(HistoryLine::Message {
            time: format_time(message.timestamp_ms),
            sender: message.display_sender(viewer).to_owned(),
            text: message.text.clone(),
        });
        prev_date = Some(date);
    }

    lines
}

/// One-line header, e.g. "3 messages, last at 14:02".
pub fn summary_line(summary: &ChatSummary) -> String {
    let noun = if summary.message_count == 1 {
        "message"
    } else {
        "messages"
    };

    match summary.last_message_unix_ms() {
        Some(timestamp_ms) => format!(
            "{} {noun}, last at {}",
            summary.message_count,
            format_time(timestamp_ms)
        ),
        None => "No messages yet".to_owned(),
    }
}

fn timestamp_to_date(timestamp_ms: i64) -> chrono::NaiveDate {
    match Local.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.date_naive(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.date_naive(),
        chrono::LocalResult::None => Local::now().date_naive(),
    }
}

fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%-d %b %Y").to_string()
}

fn format_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M").to_string(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.format("%H:%M").to_string(),
        chrono::LocalResult::None => "??:??".to_owned(),
    }
}
