use serde::Serialize;

/// Structured trace events emitted across all llamar crates.
///
/// Events serialize to JSON and flow through `tracing` to stderr; stdout
/// is reserved for the JSON-RPC wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ConfigResolved {
        global_found: bool,
        project_found: bool,
    },
    SessionCreated {
        session_key: String,
        session_id: String,
    },
    SessionSaved {
        session_key: String,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
    CompactionMarkerSeen {
        session_id: String,
        dropped_messages: usize,
    },
    SkillInvoked {
        skill: String,
        success: bool,
        elapsed_ms: u64,
    },
    SkillTimedOut {
        skill: String,
        timeout_secs: u64,
    },
    IndexUpdated {
        path: String,
        chunks: usize,
    },
    TaskExecuted {
        task_id: i64,
        success: bool,
    },
    SubagentSpawned {
        subagent_id: String,
        port: u16,
    },
    SubagentReaped {
        subagent_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "llamar_event");
    }
}
