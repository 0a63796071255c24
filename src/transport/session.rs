//! One client connection: handshake, initial snapshot, then sends and live
//! messages interleaved until either side leaves.

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::watch,
    task,
};

use crate::usecases::chat_service::ChatService;

use super::wire::{decode_client, encode_server, ClientFrame, LabelledMessage, ServerFrame};

const SESSION_EXPECTED_HELLO: &str = "EXPECTED_HELLO";
const SESSION_ALREADY_GREETED: &str = "ALREADY_GREETED";
const SESSION_MALFORMED_FRAME: &str = "MALFORMED_FRAME";
const SESSION_FRAME_TOO_LONG: &str = "FRAME_TOO_LONG";
const SESSION_STREAM_UNAVAILABLE: &str = "STREAM_UNAVAILABLE";
const SESSION_STREAM_TERMINATED: &str = "STREAM_TERMINATED";
const SESSION_READ_FAILED: &str = "READ_FAILED";

/// One line from the client, or the fact that it ran past the frame limit.
#[derive(Debug, PartialEq, Eq)]
enum ClientLine {
    Line(String),
    TooLong,
}

/// Newline-delimited reader that never buffers more than `max_len` bytes of
/// a single line. Partial lines survive a cancelled read, so `next_line` can
/// sit in a `select!`.
struct FrameReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            max_len,
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<ClientLine>> {
        let remaining = (self.max_len + 1).saturating_sub(self.buf.len()) as u64;
        let read = (&mut self.reader)
            .take(remaining)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.max_len {
            self.buf.clear();
            return Ok(Some(ClientLine::TooLong));
        } else if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let line = std::mem::take(&mut self.buf);
        if line.len() > self.max_len {
            return Ok(Some(ClientLine::TooLong));
        }
        Ok(Some(ClientLine::Line(
            String::from_utf8_lossy(&line).into_owned(),
        )))
    }
}

pub async fn run_session<S>(
    connection: S,
    service: ChatService,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(connection);
    let mut lines = FrameReader::new(reader, max_frame_bytes);

    let sender = match lines.next_line().await? {
        None => return Ok(()),
        Some(ClientLine::TooLong) => {
            let frame =
                ServerFrame::error(SESSION_FRAME_TOO_LONG, too_long_message(max_frame_bytes));
            write_frame(&mut writer, &frame).await?;
            return Ok(());
        }
        Some(ClientLine::Line(line)) => match decode_client(&line) {
            Ok(ClientFrame::Hello { sender }) => sender,
            Ok(_) | Err(_) => {
                let frame = ServerFrame::error(
                    SESSION_EXPECTED_HELLO,
                    "first frame must be {\"type\":\"hello\"}",
                );
                write_frame(&mut writer, &frame).await?;
                return Ok(());
            }
        },
    };

    let mut opened = match service.open_stream(&sender) {
        Ok(opened) => opened,
        Err(error) => {
            let frame = ServerFrame::error(SESSION_STREAM_UNAVAILABLE, error.to_string());
            write_frame(&mut writer, &frame).await?;
            return Ok(());
        }
    };
    let viewer = opened.viewer().to_owned();

    tracing::info!(viewer = %viewer, subscriber = %opened.live.id(), "session started");

    let snapshot = ServerFrame::Snapshot {
        messages: std::mem::take(&mut opened.initial)
            .into_iter()
            .map(|message| LabelledMessage::for_viewer(message, &viewer))
            .collect(),
        unread: opened.unread,
    };
    write_frame(&mut writer, &snapshot).await?;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line? {
                    None => break,
                    Some(ClientLine::TooLong) => {
                        tracing::warn!(
                            code = SESSION_FRAME_TOO_LONG,
                            viewer = %viewer,
                            max_frame_bytes,
                            "client frame over limit; closing session"
                        );
                        let frame = ServerFrame::error(
                            SESSION_FRAME_TOO_LONG,
                            too_long_message(max_frame_bytes),
                        );
                        write_frame(&mut writer, &frame).await?;
                        break;
                    }
                    Some(ClientLine::Line(line)) => line,
                };
                if line.trim().is_empty() {
                    continue;
                }

                let frame = match decode_client(&line) {
                    Ok(ClientFrame::Send { text }) => send(&service, text, &viewer).await?,
                    Ok(ClientFrame::Read { sequence }) => {
                        mark_read(&service, sequence, &viewer).await?
                    }
                    Ok(ClientFrame::Bye) => break,
                    Ok(ClientFrame::Hello { .. }) => {
                        ServerFrame::error(SESSION_ALREADY_GREETED, "session already open")
                    }
                    Err(error) => ServerFrame::error(SESSION_MALFORMED_FRAME, error.to_string()),
                };
                write_frame(&mut writer, &frame).await?;
            }
            item = opened.live.next() => {
                match item {
                    Some(Ok(message)) => {
                        let frame = ServerFrame::Message {
                            message: LabelledMessage::for_viewer(message, &viewer),
                        };
                        write_frame(&mut writer, &frame).await?;
                    }
                    Some(Err(error)) => {
                        let frame = ServerFrame::error(SESSION_STREAM_TERMINATED, error.to_string());
                        write_frame(&mut writer, &frame).await?;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    opened.live.cancel();
    tracing::info!(viewer = %viewer, "session ended");

    Ok(())
}

/// Appends on the blocking pool; a journaled store may fsync.
async fn send(service: &ChatService, text: String, viewer: &str) -> Result<ServerFrame> {
    let service = service.clone();
    let viewer = viewer.to_owned();
    let sent = task::spawn_blocking(move || service.send_message(&text, &viewer)).await?;

    Ok(match sent {
        Ok(message) => ServerFrame::Sent {
            sequence: message.sequence,
        },
        Err(error) => ServerFrame::error(error.code(), error.to_string()),
    })
}

async fn mark_read(service: &ChatService, sequence: u64, viewer: &str) -> Result<ServerFrame> {
    let service = service.clone();
    let viewer = viewer.to_owned();
    let marked = task::spawn_blocking(move || service.mark_read(&viewer, sequence)).await?;

    Ok(match marked {
        Ok(unread) => ServerFrame::Unread { unread },
        Err(error) => ServerFrame::error(SESSION_READ_FAILED, error.to_string()),
    })
}

fn too_long_message(max_frame_bytes: usize) -> String {
    format!("frames are limited to {max_frame_bytes} bytes")
}

async fn write_frame<W>(writer: &mut W, frame: &ServerFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_server(frame)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    use super::*;
    use crate::{
        broker::{
            journal::Journal,
            store::{MessageStore, DEFAULT_MAX_MESSAGE_CHARS},
        },
        transport::wire::max_frame_bytes,
    };

    struct TestClient {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl TestClient {
        fn connect(
            service: &ChatService,
            shutdown: watch::Receiver<bool>,
        ) -> (Self, tokio::task::JoinHandle<Result<()>>) {
            Self::connect_with_limit(
                service,
                max_frame_bytes(DEFAULT_MAX_MESSAGE_CHARS),
                shutdown,
            )
        }

        fn connect_with_limit(
            service: &ChatService,
            limit: usize,
            shutdown: watch::Receiver<bool>,
        ) -> (Self, tokio::task::JoinHandle<Result<()>>) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let task = tokio::spawn(run_session(server, service.clone(), limit, shutdown));
            let (reader, writer) = tokio::io::split(client);
            (
                Self {
                    lines: BufReader::new(reader).lines(),
                    writer,
                },
                task,
            )
        }

        async fn send(&mut self, raw: &str) {
            self.writer
                .write_all(format!("{raw}\n").as_bytes())
                .await
                .expect("client write");
        }

        async fn recv(&mut self) -> ServerFrame {
            let line = self
                .lines
                .next_line()
                .await
                .expect("client read")
                .expect("server frame");
            serde_json::from_str(&line).expect("valid server frame")
        }
    }

    fn service() -> ChatService {
        ChatService::over(Arc::new(MessageStore::in_memory()), 16)
    }

    #[tokio::test]
    async fn hello_returns_snapshot_and_own_sends_come_back_labelled() {
        let service = service();
        service.send_message("earlier", "bob").expect("send");
        let (_tx, rx) = watch::channel(false);
        let (mut client, _task) = TestClient::connect(&service, rx);

        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        let ServerFrame::Snapshot { messages, unread } = client.recv().await else {
            panic!("expected snapshot");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].label, "bob");
        assert_eq!(unread, 1);

        client.send(r#"{"type":"send","text":"hi there"}"#).await;
        let mut frames = vec![client.recv().await, client.recv().await];
        frames.sort_by_key(|frame| matches!(frame, ServerFrame::Message { .. }));

        assert_eq!(frames[0], ServerFrame::Sent { sequence: 2 });
        let ServerFrame::Message { message } = &frames[1] else {
            panic!("expected live message");
        };
        assert_eq!(message.label, "You");
        assert_eq!(message.message.text, "hi there");
    }

    #[tokio::test]
    async fn other_sessions_see_the_sender_name() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut bob, _bob_task) = TestClient::connect(&service, rx);
        bob.send(r#"{"type":"hello","sender":"bob"}"#).await;
        assert!(matches!(bob.recv().await, ServerFrame::Snapshot { .. }));

        service.send_message("from alice", "alice").expect("send");

        let ServerFrame::Message { message } = bob.recv().await else {
            panic!("expected live message");
        };
        assert_eq!(message.label, "alice");
    }

    #[tokio::test]
    async fn first_frame_must_be_hello() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect(&service, rx);

        client.send(r#"{"type":"send","text":"hi"}"#).await;

        let ServerFrame::Error { code, .. } = client.recv().await else {
            panic!("expected error");
        };
        assert_eq!(code, SESSION_EXPECTED_HELLO);
        task.await.expect("session task").expect("session result");
        assert!(service.snapshot().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn empty_send_reports_error_and_stores_nothing() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, _task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        client.send(r#"{"type":"send","text":"   "}"#).await;

        let ServerFrame::Error { code, .. } = client.recv().await else {
            panic!("expected error");
        };
        assert_eq!(code, "MESSAGE_EMPTY");
        assert!(service.snapshot().expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_keeps_session_open() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, _task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        client.send("{oops").await;
        let ServerFrame::Error { code, .. } = client.recv().await else {
            panic!("expected error");
        };
        assert_eq!(code, SESSION_MALFORMED_FRAME);

        client.send(r#"{"type":"send","text":"still here"}"#).await;
        let mut saw_ack = false;
        for _ in 0..2 {
            if matches!(client.recv().await, ServerFrame::Sent { sequence: 1 }) {
                saw_ack = true;
            }
        }
        assert!(saw_ack);
    }

    #[tokio::test]
    async fn bye_ends_session_and_unsubscribes() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;
        assert_eq!(service.subscriber_count(), 1);

        client.send(r#"{"type":"bye"}"#).await;

        task.await.expect("session task").expect("session result");
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropped_connection_unsubscribes() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        drop(client);

        task.await.expect("session task").expect("session result");
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_signal_ends_session() {
        let service = service();
        let (tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        tx.send(true).expect("shutdown signal");

        task.await.expect("session task").expect("session result");
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn read_frame_moves_cursor_and_reports_unread() {
        let service = service();
        service.send_message("one", "bob").expect("send");
        service.send_message("two", "bob").expect("send");
        let (_tx, rx) = watch::channel(false);
        let (mut client, _task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        assert!(matches!(
            client.recv().await,
            ServerFrame::Snapshot { unread: 2, .. }
        ));

        client.send(r#"{"type":"read","sequence":1}"#).await;

        assert_eq!(client.recv().await, ServerFrame::Unread { unread: 1 });
        assert_eq!(service.summary().expect("summary").unread_for("alice"), 1);
    }

    #[tokio::test]
    async fn overlong_line_is_rejected_and_closes_session() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect_with_limit(&service, 64, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        let text = "x".repeat(4_000);
        client
            .send(&format!(r#"{{"type":"send","text":"{text}"}}"#))
            .await;

        let ServerFrame::Error { code, .. } = client.recv().await else {
            panic!("expected error");
        };
        assert_eq!(code, SESSION_FRAME_TOO_LONG);
        task.await.expect("session task").expect("session result");
        assert!(service.snapshot().expect("snapshot").is_empty());
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn overlong_hello_is_rejected() {
        let service = service();
        let (_tx, rx) = watch::channel(false);
        let (mut client, task) = TestClient::connect_with_limit(&service, 16, rx);

        client
            .send(r#"{"type":"hello","sender":"a very long sender name"}"#)
            .await;

        let ServerFrame::Error { code, .. } = client.recv().await else {
            panic!("expected error");
        };
        assert_eq!(code, SESSION_FRAME_TOO_LONG);
        task.await.expect("session task").expect("session result");
    }

    #[tokio::test]
    async fn frame_reader_keeps_lines_at_the_limit() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, 4);
        client.write_all(b"abcd\nabcde\nok").await.expect("write");
        drop(client);

        assert_eq!(
            reader.next_line().await.expect("read"),
            Some(ClientLine::Line("abcd".to_owned()))
        );
        assert_eq!(
            reader.next_line().await.expect("read"),
            Some(ClientLine::TooLong)
        );
    }

    #[tokio::test]
    async fn journaled_sends_with_fsync_are_acknowledged() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (journal, replayed) =
            Journal::open(&dir.path().join("messages.jsonl"), true).expect("journal");
        let service = ChatService::over(Arc::new(MessageStore::journaled(journal, replayed)), 16);
        let (_tx, rx) = watch::channel(false);
        let (mut client, _task) = TestClient::connect(&service, rx);
        client.send(r#"{"type":"hello","sender":"alice"}"#).await;
        client.recv().await;

        client.send(r#"{"type":"send","text":"durable"}"#).await;

        let mut frames = vec![client.recv().await, client.recv().await];
        frames.sort_by_key(|frame| matches!(frame, ServerFrame::Message { .. }));
        assert_eq!(frames[0], ServerFrame::Sent { sequence: 1 });
    }
}
