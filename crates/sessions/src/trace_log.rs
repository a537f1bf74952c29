//! Per-session tool-call trace log.
//!
//! Each session may own `<sessionId>_trace.jsonl` next to its transcript.
//! One line per tool invocation, with argument and result text truncated
//! so the log stays readable. Trace writes are best-effort: a failed
//! append is logged and never affects the tool result.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use llamar_domain::Result;

const MAX_ARGS_CHARS: usize = 200;
const MAX_RESULT_CHARS: usize = 500;

/// One tool invocation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u32>,
    pub tool: String,
    pub args: String,
    pub result: String,
    pub success: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl TraceEntry {
    /// Build an entry from raw call data, truncating long fields.
    pub fn record(
        tool: &str,
        turn: Option<u32>,
        args: &Value,
        result_text: &str,
        success: bool,
        elapsed_ms: u64,
        approved_by: Option<String>,
    ) -> Self {
        let args_text = serde_json::to_string(args).unwrap_or_default();
        Self {
            timestamp: Utc::now().to_rfc3339(),
            turn,
            tool: tool.to_string(),
            args: truncate(&args_text, MAX_ARGS_CHARS),
            result: truncate(result_text, MAX_RESULT_CHARS),
            success,
            elapsed_ms,
            approved_by,
        }
    }
}

/// Truncate to `max` characters, appending an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

/// Trace log bound to one session.
pub struct TraceLog {
    path: PathBuf,
    session_id: String,
}

impl TraceLog {
    pub fn new(dir: &Path, session_id: &str) -> Self {
        Self {
            path: dir.join(format!("{session_id}_trace.jsonl")),
            session_id: session_id.to_string(),
        }
    }

    /// Append one entry. Errors are surfaced so the caller can decide to
    /// ignore them (the skill runner does).
    pub fn add(&self, entry: &TraceEntry) -> Result<()> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let json = serde_json::to_string(entry)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Load the last `n` entries (all when `n` is `None`).
    pub fn load(&self, n: Option<usize>) -> Result<Vec<TraceEntry>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Ok(Vec::new()),
        };
        let mut entries: Vec<TraceEntry> = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %e,
                        "skipping malformed trace line"
                    );
                }
            }
        }
        if let Some(n) = n {
            let skip = entries.len().saturating_sub(n);
            entries.drain(..skip);
        }
        Ok(entries)
    }

    /// Human-readable rendering of the last `n` entries.
    pub fn format(&self, n: Option<usize>) -> Result<String> {
        let entries = self.load(n)?;
        if entries.is_empty() {
            return Ok("No tool calls recorded.".to_string());
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|e| {
                let status = if e.success { "ok" } else { "err" };
                let turn = e
                    .turn
                    .map(|t| format!(" turn={t}"))
                    .unwrap_or_default();
                format!(
                    "[{}] {} {} ({}ms){} args={}",
                    e.timestamp, status, e.tool, e.elapsed_ms, turn, e.args
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
