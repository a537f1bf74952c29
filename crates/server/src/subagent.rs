//! Subagent supervisor.
//!
//! A subagent is a child process running another copy of this server
//! bound to a probed TCP port. The parent records its lifecycle in the
//! shared session metadata (`starting` → `running` → `completed`) and
//! keeps an in-memory registry for live queries. Expired children are
//! reaped eagerly on query and lazily by a periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;

use llamar_domain::config::SubagentConfig;
use llamar_domain::trace::TraceEvent;
use llamar_domain::{Error, Result};
use llamar_sessions::{
    session_key::subagent_session_key, store::mint_session_id, SessionStore, SubagentMeta,
    SubagentStatus,
};

use crate::mcp_client::McpClient;

/// One live child in the in-memory registry.
#[derive(Debug, Clone, Serialize)]
pub struct SubagentRecord {
    pub id: String,
    pub session_key: String,
    pub port: u16,
    pub task: String,
    pub started_at: i64,
    pub timeout_minutes: u64,
}

impl SubagentRecord {
    fn expired(&self, now_ms: i64) -> bool {
        let age_minutes = (now_ms - self.started_at) / 60_000;
        age_minutes >= self.timeout_minutes as i64
    }
}

struct LiveChild {
    record: SubagentRecord,
    process: tokio::process::Child,
}

pub struct SubagentManager {
    config: SubagentConfig,
    sessions: Arc<SessionStore>,
    children: RwLock<HashMap<String, LiveChild>>,
    /// Whether this server is itself a subagent (nesting gate).
    is_subagent: bool,
}

impl SubagentManager {
    pub fn new(config: SubagentConfig, sessions: Arc<SessionStore>, is_subagent: bool) -> Self {
        Self {
            config,
            sessions,
            children: RwLock::new(HashMap::new()),
            is_subagent,
        }
    }

    pub fn active_count(&self) -> usize {
        self.children.read().len()
    }

    pub fn list(&self) -> Vec<SubagentRecord> {
        self.children
            .read()
            .values()
            .map(|c| c.record.clone())
            .collect()
    }

    /// Probe for a free port starting at `base_port`.
    fn probe_port(&self) -> Result<u16> {
        let taken: Vec<u16> = self
            .children
            .read()
            .values()
            .map(|c| c.record.port)
            .collect();
        for offset in 0..100u16 {
            let port = self.config.base_port + offset;
            if taken.contains(&port) {
                continue;
            }
            if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
                return Ok(port);
            }
        }
        Err(Error::Subagent(format!(
            "no free port found starting at {}",
            self.config.base_port
        )))
    }

    /// Spawn a child server for a delegated task.
    pub async fn spawn(&self, task: &str, cwd: &std::path::Path) -> Result<SubagentRecord> {
        if !self.config.enabled {
            return Err(Error::Subagent("subagents are disabled".into()));
        }
        if self.is_subagent && !self.config.allow_nested {
            return Err(Error::Subagent("nested subagents are not allowed".into()));
        }
        if self.active_count() >= self.config.max_concurrent {
            return Err(Error::Subagent(format!(
                "subagent limit reached ({} running)",
                self.config.max_concurrent
            )));
        }

        let id = mint_session_id();
        let session_key = subagent_session_key(&id);
        let port = self.probe_port()?;
        let now_ms = Utc::now().timestamp_millis();

        // Record the spawn in the shared metadata before the process
        // exists, so a crashed parent leaves an auditable row.
        self.sessions.create_with_key(
            &session_key,
            &id,
            "subagent",
            "subagent",
            &cwd.to_string_lossy(),
        )?;
        self.sessions.update(&session_key, |entry| {
            entry.subagent = Some(SubagentMeta {
                port,
                task: task.to_string(),
                started_at: now_ms,
                timeout_minutes: self.config.timeout_minutes,
                status: SubagentStatus::Starting,
            });
        })?;

        let exe = std::env::current_exe()
            .map_err(|e| Error::Subagent(format!("cannot locate server binary: {e}")))?;
        let process = tokio::process::Command::new(exe)
            .arg(port.to_string())
            .arg(cwd)
            .env("LLAMAR_SUBAGENT", "1")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Subagent(format!("spawn child server: {e}")))?;

        // Wait for the child to accept its handshake.
        let mut connected = false;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            if McpClient::connect(port).await.is_ok() {
                connected = true;
                break;
            }
        }
        if !connected {
            self.sessions.update(&session_key, |entry| {
                if let Some(sub) = entry.subagent.as_mut() {
                    sub.status = SubagentStatus::Completed;
                }
            })?;
            return Err(Error::Subagent(format!(
                "child server on port {port} never became ready"
            )));
        }

        self.sessions.update(&session_key, |entry| {
            if let Some(sub) = entry.subagent.as_mut() {
                sub.status = SubagentStatus::Running;
            }
        })?;

        let record = SubagentRecord {
            id: id.clone(),
            session_key,
            port,
            task: task.to_string(),
            started_at: now_ms,
            timeout_minutes: self.config.timeout_minutes,
        };
        self.children.write().insert(
            id.clone(),
            LiveChild {
                record: record.clone(),
                process,
            },
        );

        TraceEvent::SubagentSpawned {
            subagent_id: id,
            port,
        }
        .emit();
        Ok(record)
    }

    /// Query a live subagent by invoking its `chat` tool over MCP.
    pub async fn query(&self, id: &str, message: &str) -> Result<String> {
        self.reap_expired().await;

        let port = {
            let children = self.children.read();
            let child = children
                .get(id)
                .ok_or_else(|| Error::Subagent(format!("no such subagent: {id}")))?;
            child.record.port
        };

        let mut client = McpClient::connect(port).await?;
        client
            .call_tool("chat", json!({ "message": message }))
            .await
    }

    /// Kill one subagent: mark completed, drop the connection, remove
    /// the local record.
    pub async fn kill(&self, id: &str) -> Result<()> {
        let child = self
            .children
            .write()
            .remove(id)
            .ok_or_else(|| Error::Subagent(format!("no such subagent: {id}")))?;
        self.finish(child, "killed").await;
        Ok(())
    }

    /// Reap every child past its timeout.
    pub async fn reap_expired(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let expired: Vec<String> = self
            .children
            .read()
            .values()
            .filter(|c| c.record.expired(now_ms))
            .map(|c| c.record.id.clone())
            .collect();

        for id in expired {
            let child = self.children.write().remove(&id);
            if let Some(child) = child {
                self.finish(child, "timeout").await;
            }
        }
    }

    async fn finish(&self, mut child: LiveChild, reason: &str) {
        let _ = child.process.kill().await;
        let _ = self.sessions.update(&child.record.session_key, |entry| {
            if let Some(sub) = entry.subagent.as_mut() {
                sub.status = SubagentStatus::Completed;
            }
        });
        TraceEvent::SubagentReaped {
            subagent_id: child.record.id.clone(),
            reason: reason.to_string(),
        }
        .emit();
    }

    /// Periodic cleanup sweep until shutdown.
    pub async fn run_sweep(self: Arc<Self>, shutdown: crate::shutdown::Shutdown) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reap_expired().await,
                _ = shutdown.cancelled() => return,
            }
        }
    }
}
