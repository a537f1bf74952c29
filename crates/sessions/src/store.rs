//! Session metadata store.
//!
//! All sessions for an agent live in one `sessions.json` under
//! `<agents_root>/<agent_id>/sessions/`, keyed by session key. The file is
//! shared with subagent processes, so every read-modify-write takes an
//! exclusive advisory lock on a sibling lock file and lands through a
//! write-then-rename so readers never observe a torn file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::session_key::main_session_key;
use llamar_domain::trace::TraceEvent;
use llamar_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of a child tool server recorded in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Starting,
    Running,
    Completed,
}

/// Subagent lifecycle sub-record carried by subagent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentMeta {
    pub port: u16,
    pub task: String,
    pub started_at: i64,
    pub timeout_minutes: u64,
    pub status: SubagentStatus,
}

/// A single session tracked in `sessions.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    pub session_key: String,
    /// Milliseconds since the epoch.
    pub created_at: i64,
    pub updated_at: i64,
    pub provider: String,
    pub model: String,
    pub cwd: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub compaction_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent: Option<SubagentMeta>,
}

/// A list row: the stored entry plus its on-disk message count.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub entry: SessionEntry,
    pub message_count: usize,
}

/// A loaded session: the store entry plus its (possibly compacted)
/// message history.
#[derive(Debug, Clone)]
pub struct Session {
    pub entry: SessionEntry,
    pub messages: Vec<crate::transcript::TranscriptMessage>,
}

impl Session {
    /// Append a message in memory only. Persisting goes through
    /// [`crate::Transcript::append`].
    pub fn add_message(&mut self, role: &str, text: &str) {
        self.messages
            .push(crate::transcript::TranscriptMessage::new(role, text));
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Mint a random 128-bit session identifier as lowercase hex.
pub fn mint_session_id() -> String {
    uuid::Uuid::new_v4().as_simple().to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session store rooted at `<agents_root>/<agent_id>/sessions/`.
pub struct SessionStore {
    dir: PathBuf,
}

/// Guard holding the exclusive advisory lock on `sessions.json.lock`.
struct StoreLock {
    file: std::fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl SessionStore {
    pub fn new(agents_root: &Path, agent_id: &str) -> Result<Self> {
        let dir = agents_root.join(agent_id).join("sessions");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding `sessions.json`, transcripts, and trace logs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sessions_path(&self) -> PathBuf {
        self.dir.join("sessions.json")
    }

    fn acquire_lock(&self) -> Result<StoreLock> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join("sessions.json.lock"))?;
        file.lock_exclusive()
            .map_err(|e| Error::Store(format!("lock sessions.json: {e}")))?;
        Ok(StoreLock { file })
    }

    fn read_all(&self) -> HashMap<String, SessionEntry> {
        let raw = match std::fs::read_to_string(self.sessions_path()) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "sessions.json is malformed; starting from empty");
            HashMap::new()
        })
    }

    fn write_all(&self, sessions: &HashMap<String, SessionEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(sessions)?;
        let tmp = self.dir.join(".sessions.json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, self.sessions_path())?;
        Ok(())
    }

    /// Run one read-modify-write critical section under the file lock.
    fn with_sessions<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, SessionEntry>) -> T,
    ) -> Result<T> {
        let _lock = self.acquire_lock()?;
        let mut sessions = self.read_all();
        let out = f(&mut sessions);
        self.write_all(&sessions)?;
        Ok(out)
    }

    /// Mint a new session and upsert its store entry. The caller writes
    /// the transcript header separately (see [`crate::Transcript::create`]).
    pub fn create(&self, provider: &str, model: &str, cwd: &str) -> Result<SessionEntry> {
        let id = mint_session_id();
        let key = main_session_key(&id);
        self.create_with_key(&key, &id, provider, model, cwd)
    }

    /// Upsert an entry under an explicit key (used for subagent sessions).
    pub fn create_with_key(
        &self,
        session_key: &str,
        session_id: &str,
        provider: &str,
        model: &str,
        cwd: &str,
    ) -> Result<SessionEntry> {
        let now = now_ms();
        let entry = SessionEntry {
            session_id: session_id.to_string(),
            session_key: session_key.to_string(),
            created_at: now,
            updated_at: now,
            provider: provider.to_string(),
            model: model.to_string(),
            cwd: cwd.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            compaction_count: 0,
            subagent: None,
        };

        self.with_sessions(|sessions| {
            sessions.insert(session_key.to_string(), entry.clone());
        })?;

        TraceEvent::SessionCreated {
            session_key: session_key.to_string(),
            session_id: session_id.to_string(),
        }
        .emit();

        Ok(entry)
    }

    /// Upsert token counters, compaction count, model identity, and
    /// `updatedAt` for an existing entry.
    pub fn save(&self, entry: &SessionEntry) -> Result<()> {
        let mut entry = entry.clone();
        entry.updated_at = now_ms();
        let key = entry.session_key.clone();
        self.with_sessions(move |sessions| {
            sessions.insert(entry.session_key.clone(), entry);
        })?;
        TraceEvent::SessionSaved { session_key: key }.emit();
        Ok(())
    }

    /// Apply a closure to one entry under the lock. Returns the updated
    /// entry, or `None` when the key is unknown.
    pub fn update(
        &self,
        session_key: &str,
        f: impl FnOnce(&mut SessionEntry),
    ) -> Result<Option<SessionEntry>> {
        self.with_sessions(|sessions| {
            sessions.get_mut(session_key).map(|entry| {
                f(entry);
                entry.updated_at = now_ms();
                entry.clone()
            })
        })
    }

    /// Look up one entry by key.
    pub fn get(&self, session_key: &str) -> Option<SessionEntry> {
        self.read_all().get(session_key).cloned()
    }

    /// Load a session with its message history. `from_compaction` drops
    /// messages before the latest compaction marker.
    pub fn load(&self, session_key: &str, from_compaction: bool) -> Result<Option<Session>> {
        let Some(entry) = self.get(session_key) else {
            return Ok(None);
        };
        let messages = crate::transcript::Transcript::new(&self.dir)
            .load(&entry.session_id, from_compaction)?;
        Ok(Some(Session { entry, messages }))
    }

    /// Remove an entry. Returns `true` when it existed.
    pub fn remove(&self, session_key: &str) -> Result<bool> {
        self.with_sessions(|sessions| sessions.remove(session_key).is_some())
    }

    /// Up to `n` entries sorted by `updatedAt` descending, each augmented
    /// with its current transcript message count from disk.
    pub fn list(&self, n: usize) -> Vec<SessionSummary> {
        let mut entries: Vec<SessionEntry> = self.read_all().into_values().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries.truncate(n);
        entries
            .into_iter()
            .map(|entry| {
                let message_count = crate::transcript::Transcript::new(&self.dir)
                    .count(&entry.session_id)
                    .unwrap_or(0);
                SessionSummary {
                    entry,
                    message_count,
                }
            })
            .collect()
    }

    /// All live subagent entries (status not completed).
    pub fn live_subagents(&self) -> Vec<SessionEntry> {
        self.read_all()
            .into_values()
            .filter(|e| {
                e.subagent
                    .as_ref()
                    .is_some_and(|s| s.status != SubagentStatus::Completed)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> SessionStore {
        SessionStore::new(dir, "main").unwrap()
    }

    #[test]
    fn create_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let entry = store.create("openai", "gpt-4o", "/work").unwrap();
        assert!(entry.session_key.starts_with("llamar:"));
        assert_eq!(entry.session_id.len(), 32);

        let loaded = store.get(&entry.session_key).unwrap();
        assert_eq!(loaded.session_id, entry.session_id);
        assert_eq!(loaded.provider, "openai");
        assert_eq!(loaded.compaction_count, 0);
    }

    #[test]
    fn save_updates_counters_and_timestamp() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let mut entry = store.create("openai", "gpt-4o", "/work").unwrap();
        entry.input_tokens = 120;
        entry.output_tokens = 80;
        entry.total_tokens = 200;
        entry.compaction_count = 1;
        store.save(&entry).unwrap();

        let loaded = store.get(&entry.session_key).unwrap();
        assert_eq!(loaded.total_tokens, 200);
        assert_eq!(loaded.compaction_count, 1);
        assert!(loaded.updated_at >= entry.created_at);
    }

    #[test]
    fn update_unknown_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let result = store.update("llamar:missing", |_| {}).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn list_sorts_by_recency() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let first = store.create("openai", "gpt-4o", "/a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.create("openai", "gpt-4o", "/b").unwrap();

        let listed = store.list(10);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].entry.session_id, second.session_id);
        assert_eq!(listed[1].entry.session_id, first.session_id);

        let one = store.list(1);
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn malformed_store_file_recovers_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        std::fs::write(store.dir().join("sessions.json"), "{broken").unwrap();
        assert!(store.get("llamar:x").is_none());
        // A create still succeeds and replaces the broken file.
        store.create("openai", "gpt-4o", "/w").unwrap();
        assert_eq!(store.list(10).len(), 1);
    }

    #[test]
    fn load_round_trips_messages() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let transcript = crate::transcript::Transcript::new(store.dir());

        let entry = store.create("openai", "gpt-4o", "/work").unwrap();
        transcript.create(&entry.session_id, "/work").unwrap();
        transcript
            .append(
                &entry.session_id,
                &crate::transcript::TranscriptMessage::new("user", "hello"),
            )
            .unwrap();
        transcript
            .append(
                &entry.session_id,
                &crate::transcript::TranscriptMessage::new("assistant", "hi"),
            )
            .unwrap();

        let session = store.load(&entry.session_key, true).unwrap().unwrap();
        assert_eq!(session.entry.session_id, entry.session_id);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, "user");
        assert_eq!(session.messages[0].text(), "hello");
        assert_eq!(session.messages[1].role, "assistant");
        assert_eq!(session.messages[1].text(), "hi");
    }

    #[test]
    fn add_message_is_in_memory_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let entry = store.create("openai", "gpt-4o", "/work").unwrap();
        crate::transcript::Transcript::new(store.dir())
            .create(&entry.session_id, "/work")
            .unwrap();

        let mut session = store.load(&entry.session_key, true).unwrap().unwrap();
        session.add_message("user", "scratch");
        assert_eq!(session.messages.len(), 1);

        // Reloading shows nothing was persisted.
        let reloaded = store.load(&entry.session_key, true).unwrap().unwrap();
        assert!(reloaded.messages.is_empty());
    }

    #[test]
    fn load_unknown_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        assert!(store.load("llamar:missing", true).unwrap().is_none());
    }

    #[test]
    fn subagent_entries_filterable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let entry = store
            .create_with_key(
                "agent:main:subagent:abc",
                "abc",
                "openai",
                "gpt-4o",
                "/w",
            )
            .unwrap();
        store
            .update(&entry.session_key, |e| {
                e.subagent = Some(SubagentMeta {
                    port: 8701,
                    task: "summarize logs".into(),
                    started_at: 0,
                    timeout_minutes: 30,
                    status: SubagentStatus::Running,
                });
            })
            .unwrap();

        assert_eq!(store.live_subagents().len(), 1);

        store
            .update(&entry.session_key, |e| {
                if let Some(sub) = e.subagent.as_mut() {
                    sub.status = SubagentStatus::Completed;
                }
            })
            .unwrap();
        assert!(store.live_subagents().is_empty());
    }
}
