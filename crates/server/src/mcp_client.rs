//! Minimal MCP client over TCP, used by the supervisor to talk to child
//! tool servers.
//!
//! Newline-delimited JSON-RPC; each request/response cycle is serialized
//! by `&mut self`, so concurrent callers cannot read each other's
//! responses.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use llamar_domain::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct McpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl McpClient {
    /// Connect and run the MCP handshake (`initialize` +
    /// `notifications/initialized`).
    pub async fn connect(port: u16) -> Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| Error::Subagent(format!("connect to port {port}: {e}")))?;
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: 1,
        };

        client
            .request(
                "initialize",
                json!({
                    "protocolVersion": crate::rpc::PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "llamar-supervisor", "version": env!("CARGO_PKG_VERSION") },
                }),
            )
            .await?;
        client
            .notify("notifications/initialized")
            .await?;
        Ok(client)
    }

    async fn write_line(&mut self, value: &Value) -> Result<()> {
        let line = serde_json::to_string(value)?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(Error::Io)?;
        self.writer.write_all(b"\n").await.map_err(Error::Io)?;
        self.writer.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    /// Send a notification (no response expected).
    pub async fn notify(&mut self, method: &str) -> Result<()> {
        self.write_line(&json!({ "jsonrpc": "2.0", "method": method }))
            .await
    }

    /// Send a request and wait for the matching response's `result`.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.write_line(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, async {
            loop {
                let mut line = String::new();
                let read = self
                    .reader
                    .read_line(&mut line)
                    .await
                    .map_err(Error::Io)?;
                if read == 0 {
                    return Err(Error::Subagent("server closed connection".into()));
                }
                let value: Value = match serde_json::from_str(line.trim()) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                if value.get("id").and_then(|v| v.as_u64()) == Some(id) {
                    return Ok(value);
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout(format!("no response to {method}")))??;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            return Err(Error::Subagent(format!("rpc error: {message}")));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Invoke a tool and flatten its text content.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
            )
            .await?;

        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let text = result
            .get("content")
            .and_then(|c| c.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if is_error {
            return Err(Error::Subagent(format!("tool '{name}' failed: {text}")));
        }
        Ok(text)
    }
}
