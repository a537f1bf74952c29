//! Socket transport: a TCP accept loop serving one connection at a time.
//!
//! Each connection runs the same read/dispatch/write loop as stdio, so
//! responses within a connection are emitted in request-arrival order and
//! one `tools/call` fully completes before the next request is read.
//! Closing the client connection discards any in-flight result.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use llamar_domain::Result;

use crate::rpc::{flush_session, ConnState, RpcHandler};
use crate::shutdown::Shutdown;
use crate::state::ServerState;

pub async fn run_socket(state: Arc<ServerState>, port: u16, shutdown: Shutdown) -> Result<()> {
    // Failure to bind is the one fatal startup condition.
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "socket transport listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "connection accepted");
                        if let Err(e) = serve_connection(state.clone(), stream).await {
                            tracing::warn!(error = %e, "connection ended with error");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("socket transport stopping");
                return Ok(());
            }
        }
    }
}

async fn serve_connection(state: Arc<ServerState>, stream: TcpStream) -> Result<()> {
    let handler = RpcHandler::new(state.clone());
    let mut conn = ConnState::default();

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if let Some(response) = handler.handle_line(&line, &mut conn).await {
            write_half.write_all(response.as_bytes()).await?;
            write_half.write_all(b"\n").await?;
            write_half.flush().await?;
        }
    }

    // Session lifecycle: closed when its connection drops.
    flush_session(&state, &conn);
    Ok(())
}
