//! SQLite-backed full-text chunk index.
//!
//! Three tables: `files` (one row per indexed path with change-detection
//! metadata), `chunks` (line-range slices with deterministic ids), and an
//! FTS5 virtual table over `chunks.text` kept in lock-step via triggers.
//!
//! Re-indexing is an atomic set-replacement per path; an unchanged path
//! (same mtime, size, and content hash) is a no-op.

use std::path::Path;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::chunk::{chunk_lines, hash, LineChunk};
use llamar_domain::trace::TraceEvent;
use llamar_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    hash TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    size INTEGER NOT NULL,
    indexed_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    source TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    hash TEXT NOT NULL,
    text TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    content='chunks',
    tokenize='porter unicode61'
);

-- Keep FTS5 in sync via triggers
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text)
    VALUES ('delete', old.rowid, old.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text)
    VALUES ('delete', old.rowid, old.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (new.rowid, new.text);
END;
";

/// One full-text search result.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub id: String,
    pub path: String,
    pub source: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Single-writer chunk index. All access serializes through the
/// connection mutex; the index owner is the only writer in the process.
pub struct MemoryIndex {
    conn: Mutex<Connection>,
}

impl MemoryIndex {
    /// Open or create the index file, applying the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("open chunk index: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Store(format!("chunk index pragmas: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Store(format!("chunk index schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory index for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("open chunk index: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Store(format!("chunk index schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Index a file. Returns the number of chunks written, or 0 when the
    /// stored `(mtime, size, hash)` triple shows the file is unchanged.
    pub fn index_file(&self, path: &Path, source: &str) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = meta.len() as i64;

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let chunks = chunk_lines(&lines, 50, 10);
        self.replace_chunks(path, source, &content, mtime, size, &chunks)
    }

    /// Index a JSONL agent transcript: each line's message is rendered as
    /// `"User: …"` / `"Assistant: …"` before chunking with smaller
    /// windows (size 30, overlap 5).
    pub fn index_claude_session(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = meta.len() as i64;

        let mut rendered = Vec::new();
        for line in content.lines() {
            let value: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let role = match value.get("role").and_then(|r| r.as_str()) {
                Some("user") => "User",
                Some("assistant") => "Assistant",
                _ => continue,
            };
            let text = message_text(&value);
            if text.is_empty() {
                continue;
            }
            for (i, part) in text.lines().enumerate() {
                if i == 0 {
                    rendered.push(format!("{role}: {part}"));
                } else {
                    rendered.push(part.to_string());
                }
            }
        }

        let joined = rendered.join("\n");
        let chunks = chunk_lines(&rendered, 30, 5);
        self.replace_chunks(path, "session", &joined, mtime, size, &chunks)
    }

    fn replace_chunks(
        &self,
        path: &Path,
        source: &str,
        content: &str,
        mtime: i64,
        size: i64,
        chunks: &[LineChunk],
    ) -> Result<usize> {
        let path_str = path.to_string_lossy().to_string();
        let content_hash = hash(content);
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.clone());

        let mut conn = self.conn.lock();

        // Unchanged file: nothing to do.
        let existing: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT hash, mtime, size FROM files WHERE path = ?1",
                params![path_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .ok();
        if let Some((h, m, s)) = existing {
            if h == content_hash && m == mtime && s == size {
                return Ok(0);
            }
        }

        let now = chrono::Utc::now().timestamp();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Store(format!("begin index txn: {e}")))?;

        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path_str])
            .map_err(|e| Error::Store(format!("delete stale chunks: {e}")))?;

        for chunk in chunks {
            let id = format!("{basename}:{}-{}", chunk.start_line, chunk.end_line);
            tx.execute(
                "INSERT OR REPLACE INTO chunks \
                 (id, path, source, start_line, end_line, hash, text, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    path_str,
                    source,
                    chunk.start_line as i64,
                    chunk.end_line as i64,
                    hash(&chunk.text),
                    chunk.text,
                    now
                ],
            )
            .map_err(|e| Error::Store(format!("insert chunk: {e}")))?;
        }

        tx.execute(
            "INSERT INTO files (path, source, hash, mtime, size, indexed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(path) DO UPDATE SET \
               source = excluded.source, hash = excluded.hash, \
               mtime = excluded.mtime, size = excluded.size, \
               indexed_at = excluded.indexed_at",
            params![path_str, source, content_hash, mtime, size, now],
        )
        .map_err(|e| Error::Store(format!("upsert file row: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Store(format!("commit index txn: {e}")))?;

        TraceEvent::IndexUpdated {
            path: path_str,
            chunks: chunks.len(),
        }
        .emit();

        Ok(chunks.len())
    }

    /// Full-text query ordered by FTS rank.
    pub fn search_fts(
        &self,
        query: &str,
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ChunkHit>> {
        let sanitized = sanitize_match_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let (sql, use_source) = match source {
            Some(_) => (
                "SELECT c.id, c.path, c.source, c.start_line, c.end_line, c.text \
                 FROM chunks_fts JOIN chunks c ON c.rowid = chunks_fts.rowid \
                 WHERE chunks_fts MATCH ?1 AND c.source = ?2 \
                 ORDER BY rank LIMIT ?3",
                true,
            ),
            None => (
                "SELECT c.id, c.path, c.source, c.start_line, c.end_line, c.text \
                 FROM chunks_fts JOIN chunks c ON c.rowid = chunks_fts.rowid \
                 WHERE chunks_fts MATCH ?1 \
                 ORDER BY rank LIMIT ?2",
                false,
            ),
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Store(format!("prepare fts query: {e}")))?;

        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<ChunkHit> {
            Ok(ChunkHit {
                id: row.get(0)?,
                path: row.get(1)?,
                source: row.get(2)?,
                start_line: row.get::<_, i64>(3)? as usize,
                end_line: row.get::<_, i64>(4)? as usize,
                text: row.get(5)?,
            })
        };

        let rows = if use_source {
            stmt.query_map(
                params![sanitized, source.unwrap(), limit as i64],
                map_row,
            )
        } else {
            stmt.query_map(params![sanitized, limit as i64], map_row)
        }
        .map_err(|e| Error::Store(format!("run fts query: {e}")))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(|e| Error::Store(format!("read fts row: {e}")))?);
        }
        Ok(hits)
    }

    /// Number of chunks currently stored for a path.
    pub fn chunk_count(&self, path: &Path) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE path = ?1",
                params![path.to_string_lossy()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Store(format!("count chunks: {e}")))?;
        Ok(count as usize)
    }

    /// Drop a path's file row and chunks.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Store(format!("begin remove txn: {e}")))?;
        let path_str = path.to_string_lossy().to_string();
        tx.execute("DELETE FROM chunks WHERE path = ?1", params![path_str])
            .map_err(|e| Error::Store(format!("delete chunks: {e}")))?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path_str])
            .map_err(|e| Error::Store(format!("delete file row: {e}")))?;
        tx.commit()
            .map_err(|e| Error::Store(format!("commit remove txn: {e}")))?;
        Ok(())
    }
}

/// Extract the plain text of a transcript message: either a string
/// `content` or an array of `{type:"text", text}` items.
fn message_text(value: &serde_json::Value) -> String {
    match value.get("content") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| {
                (p.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .then(|| p.get("text").and_then(|t| t.as_str()).unwrap_or(""))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Quote each term for FTS5 MATCH so punctuation in user queries cannot
/// break the query syntax. Terms without any alphanumeric content are
/// dropped entirely.
fn sanitize_match_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '-' || *c == '_')
                .collect::<String>()
        })
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" ")
}
