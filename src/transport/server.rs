use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::watch, task::JoinSet};

use crate::usecases::chat_service::ChatService;

use super::session::run_session;

const SERVER_ACCEPT_FAILED: &str = "SERVER_ACCEPT_FAILED";
const SERVER_SESSION_FAILED: &str = "SERVER_SESSION_FAILED";

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind chat server to {addr}"))
}

/// Accepts connections until `shutdown` flips to true, then waits for every
/// session to wind down.
pub async fn serve(
    listener: TcpListener,
    service: ChatService,
    max_frame_bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "chat server listening");

    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let service = service.clone();
                        let shutdown = shutdown.clone();
                        sessions.spawn(async move {
                            tracing::debug!(peer = %peer, "connection accepted");
                            let session = run_session(socket, service, max_frame_bytes, shutdown);
                            if let Err(error) = session.await {
                                report_session_failure(peer, &error);
                            }
                        });
                    }
                    Err(error) => {
                        tracing::warn!(
                            code = SERVER_ACCEPT_FAILED,
                            error = %error,
                            "failed to accept connection"
                        );
                    }
                }
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    tracing::info!(open_sessions = sessions.len(), "chat server shutting down");
    while sessions.join_next().await.is_some() {}

    Ok(())
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn run_until_ctrl_c(
    bind_addr: &str,
    service: ChatService,
    max_frame_bytes: usize,
) -> Result<()> {
    let listener = bind(bind_addr).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
        }
        let _ = shutdown_tx.send(true);
    });

    serve(listener, service, max_frame_bytes, shutdown_rx).await
}

fn report_session_failure(peer: SocketAddr, error: &anyhow::Error) {
    tracing::warn!(
        code = SERVER_SESSION_FAILED,
        peer = %peer,
        error = ?error,
        "session ended with an error"
    );
}
