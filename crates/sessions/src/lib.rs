//! Session persistence: the `sessions.json` metadata store, append-only
//! JSONL transcripts with compaction markers, and per-session tool-call
//! trace logs.

pub mod session_key;
pub mod store;
pub mod trace_log;
pub mod transcript;

pub use session_key::{main_session_key, subagent_session_key};
pub use store::{Session, SessionEntry, SessionStore, SubagentMeta, SubagentStatus};
pub use trace_log::{TraceEntry, TraceLog};
pub use transcript::{
    Transcript, TranscriptHeader, TranscriptMessage, COMPACTION_PREFIX,
};
