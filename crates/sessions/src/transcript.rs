//! Append-only JSONL transcripts.
//!
//! Each session owns `<sessionId>.jsonl` in the sessions directory. Line 1
//! is the header; every subsequent line is one message. Appending never
//! rewrites existing lines. Compaction adds an assistant message whose
//! text starts with [`COMPACTION_PREFIX`]; loaders asked for the compacted
//! view drop everything before the latest such marker.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use llamar_domain::envelope::ContentItem;
use llamar_domain::trace::TraceEvent;
use llamar_domain::Result;

/// Marker prefix on compaction-summary messages.
pub const COMPACTION_PREFIX: &str = "[Compaction Summary]\n\n";

/// The first line of every transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptHeader {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub version: u32,
    pub id: String,
    pub timestamp: String,
    pub cwd: String,
}

/// One message line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub role: String,
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TranscriptMessage {
    pub fn new(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ContentItem::text(text)],
            stop_reason: None,
            provider: None,
            model: None,
            usage: None,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    /// First text item, or the empty string.
    pub fn text(&self) -> &str {
        self.content
            .iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .unwrap_or("")
    }

    /// Whether this message is a compaction marker.
    pub fn is_compaction_marker(&self) -> bool {
        self.role == "assistant" && self.text().starts_with(COMPACTION_PREFIX)
    }
}

/// Transcript reader/writer bound to a sessions directory.
pub struct Transcript {
    dir: PathBuf,
}

impl Transcript {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    /// Write the header line, only if the file does not already exist.
    pub fn create(&self, session_id: &str, cwd: &str) -> Result<()> {
        let path = self.path(session_id);
        if path.exists() {
            return Ok(());
        }
        let header = TranscriptHeader {
            entry_type: "session".into(),
            version: 2,
            id: session_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            cwd: cwd.to_string(),
        };
        self.append_line(session_id, &serde_json::to_string(&header)?)
    }

    /// Append one message as a single JSON line.
    pub fn append(&self, session_id: &str, message: &TranscriptMessage) -> Result<()> {
        self.append_line(session_id, &serde_json::to_string(message)?)?;
        TraceEvent::TranscriptAppend {
            session_id: session_id.to_string(),
            lines: 1,
        }
        .emit();
        Ok(())
    }

    fn append_line(&self, session_id: &str, line: &str) -> Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(&self.dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(session_id))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Append a compaction marker summarizing older history.
    pub fn compact(&self, session_id: &str, summary: &str) -> Result<()> {
        let message =
            TranscriptMessage::new("assistant", &format!("{COMPACTION_PREFIX}{summary}"));
        self.append(session_id, &message)
    }

    /// Load messages. With `from_compaction`, messages before the latest
    /// compaction marker are dropped (the marker itself is kept).
    pub fn load(&self, session_id: &str, from_compaction: bool) -> Result<Vec<TranscriptMessage>> {
        let path = self.path(session_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Ok(Vec::new()),
        };

        let mut messages = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Skip the header (and any future non-message entry types).
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                if value.get("type").is_some() {
                    continue;
                }
            }
            match serde_json::from_str::<TranscriptMessage>(trimmed) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        error = %e,
                        "skipping malformed transcript line"
                    );
                }
            }
        }

        if from_compaction {
            if let Some(marker) = messages.iter().rposition(|m| m.is_compaction_marker()) {
                TraceEvent::CompactionMarkerSeen {
                    session_id: session_id.to_string(),
                    dropped_messages: marker,
                }
                .emit();
                messages.drain(..marker);
            }
        }

        Ok(messages)
    }

    /// Number of message lines on disk (the header does not count).
    pub fn count(&self, session_id: &str) -> Result<usize> {
        Ok(self.load(session_id, false)?.len())
    }

    /// Parse the header line, if the transcript exists and has one.
    pub fn header(&self, session_id: &str) -> Option<TranscriptHeader> {
        let raw = std::fs::read_to_string(self.path(session_id)).ok()?;
        let first = raw.lines().next()?;
        serde_json::from_str(first).ok()
    }
}
