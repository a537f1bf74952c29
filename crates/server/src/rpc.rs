//! JSON-RPC 2.0 method dispatch for the MCP surface.
//!
//! One line in, at most one line out. A request with an `id` member gets
//! exactly one response whose `id` mirrors it verbatim (null included); a
//! request without one is a notification and produces no bytes at all.
//! Malformed JSON is logged to stderr and discarded.

use std::sync::Arc;

use serde_json::{json, Value};

use llamar_domain::envelope::ToolResult;
use llamar_policy::{resolve, Decision};
use llamar_sessions::TraceLog;
use llamar_skills::{run_skill, RunOptions, SkillContext};

use crate::state::ServerState;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "llamar";

/// Per-connection state: the lazily created session and its trace log.
#[derive(Default)]
pub struct ConnState {
    pub session: Option<llamar_sessions::SessionEntry>,
    pub traces: Option<Arc<TraceLog>>,
    pub turn: u32,
}

pub struct RpcHandler {
    state: Arc<ServerState>,
}

impl RpcHandler {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Handle one wire line. `None` means no bytes go back.
    pub async fn handle_line(&self, line: &str, conn: &mut ConnState) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed JSON-RPC input");
                return None;
            }
        };

        // Presence of the `id` member decides request vs notification.
        let id = request.get("id").cloned();
        let is_notification = id.is_none();
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let body = match method.as_str() {
            "initialize" => json!({ "result": self.initialize() }),
            method if method.starts_with("notifications/") => return None,
            "tools/list" => json!({ "result": self.tools_list() }),
            "tools/call" => {
                let envelope = self.tools_call(&params, conn).await;
                json!({ "result": envelope })
            }
            other => json!({
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {other}"),
                }
            }),
        };

        if is_notification {
            return None;
        }

        let mut response = json!({ "jsonrpc": "2.0", "id": id });
        if let (Some(obj), Some(body_obj)) = (response.as_object_mut(), body.as_object()) {
            for (key, value) in body_obj {
                obj.insert(key.clone(), value.clone());
            }
        }
        serde_json::to_string(&response).ok()
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn tools_list(&self) -> Value {
        let defs = self
            .state
            .registry
            .list(self.state.allowed_tools.as_ref());
        json!({ "tools": defs })
    }

    /// Ensure the connection owns a session (created lazily on the first
    /// tool call) so traces have an owner.
    fn ensure_session(&self, conn: &mut ConnState) {
        if conn.session.is_some() {
            return;
        }
        let config = &self.state.config;
        match self.state.sessions.create(
            &config.provider,
            &config.model,
            &self.state.cwd.to_string_lossy(),
        ) {
            Ok(entry) => {
                if let Err(e) = self
                    .state
                    .transcript
                    .create(&entry.session_id, &entry.cwd)
                {
                    tracing::warn!(error = %e, "transcript header write failed");
                }
                conn.traces = Some(Arc::new(TraceLog::new(
                    self.state.sessions.dir(),
                    &entry.session_id,
                )));
                conn.session = Some(entry);
            }
            Err(e) => {
                tracing::warn!(error = %e, "session creation failed; continuing untracked");
            }
        }
    }

    async fn tools_call(&self, params: &Value, conn: &mut ConnState) -> ToolResult {
        let name = params
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default();
        let args = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        if name.is_empty() {
            return ToolResult::error("Tool name is missing");
        }
        if !self.state.tool_allowed(name) {
            return ToolResult::error(format!("Tool not available: {name}"));
        }
        let Some(skill) = self.state.registry.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"));
        };

        // Permission gate, before any side effect.
        let approved_by = match resolve(name, &self.state.config) {
            Decision::Allow => None,
            Decision::Deny => {
                return ToolResult::error(format!("Permission denied for tool '{name}'"));
            }
            Decision::Ask => match &self.state.approval {
                Some(hook) => {
                    if hook.approve(name, &args).await {
                        Some("user".to_string())
                    } else {
                        return ToolResult::error(format!(
                            "Permission denied for tool '{name}': user declined"
                        ));
                    }
                }
                // Headless server: ask degrades to deny.
                None => {
                    return ToolResult::error(format!(
                        "Permission denied for tool '{name}': approval required but no \
                         approver is available"
                    ));
                }
            },
        };

        // The chat tool fronts the LLM; consult the limiter first.
        if name == "chat" {
            let est_tokens = (args
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::len)
                .unwrap_or(0)
                / 4) as u64;
            match self.state.rate.check(&self.state.config.provider, est_tokens) {
                crate::rate::RateCheck::Exceeded(message) => {
                    return ToolResult::error(message);
                }
                crate::rate::RateCheck::Warn(message) => {
                    tracing::warn!(provider = %self.state.config.provider, "{message}");
                }
                crate::rate::RateCheck::Ok => {}
            }
            self.state
                .rate
                .track(&self.state.config.provider, est_tokens, 1);
        }

        self.ensure_session(conn);
        conn.turn += 1;

        let ctx = Arc::new(SkillContext {
            config: self.state.config.clone(),
            cwd: self.state.cwd.clone(),
            agent_id: self.state.agent_id.clone(),
            session_id: conn.session.as_ref().map(|s| s.session_id.clone()),
            turn: Some(conn.turn),
            traces: conn.traces.clone(),
        });

        let opts = RunOptions {
            timeout: std::time::Duration::from_secs(self.state.config.skill_timeout),
            dry_run: self.state.config.dry_run,
            approved_by,
        };

        run_skill(skill, ctx, args, opts).await
    }
}

/// Flush a connection's session entry at end of life.
pub fn flush_session(state: &ServerState, conn: &ConnState) {
    if let Some(entry) = &conn.session {
        if let Err(e) = state.sessions.save(entry) {
            tracing::warn!(error = %e, "final session flush failed");
        }
    }
}
