//! Stdio transport: read one line from stdin, dispatch, write the
//! response followed by a newline, flush. EOF ends the loop cleanly.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use llamar_domain::Result;

use crate::rpc::{flush_session, ConnState, RpcHandler};
use crate::state::ServerState;

pub async fn run_stdio(state: Arc<ServerState>) -> Result<()> {
    let handler = RpcHandler::new(state.clone());
    let mut conn = ConnState::default();

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if let Some(response) = handler.handle_line(&line, &mut conn).await {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    flush_session(&state, &conn);
    tracing::info!("stdin closed, stdio transport stopping");
    Ok(())
}
