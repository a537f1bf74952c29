//! The Markdown face of the memory store.
//!
//! `MEMORY.md` is both human-edited and machine-parsed: a top-level
//! `# Memory` heading with `## <Category>` sections whose entries are
//! lines shaped `- <text> (YYYY-MM-DD) #tag1 #tag2`. The parser tolerates
//! extra whitespace, mixed-case headings, and blank sections. Every stored
//! fact also lands in a daily append log under `memory/YYYY-MM-DD.md`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::Serialize;

use llamar_domain::{Error, Result};

/// Which memory file an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// `~/.llamar/workspace/MEMORY.md`
    Global,
    /// `<cwd>/.llamar/MEMORY.md`
    Project,
}

/// One parsed entry returned from a memory search.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryHit {
    pub text: String,
    pub tags: Vec<String>,
    pub date: Option<String>,
    pub section: String,
    pub scope: MemoryScope,
    pub line: usize,
    pub raw: String,
}

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-\s+(?P<text>.*?)\s+\((?P<date>\d{4}-\d{2}-\d{2})\)(?P<tags>(?:\s+#[A-Za-z0-9_-]+)*)\s*$")
        .expect("entry regex compiles")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z0-9_-]+)").expect("tag regex compiles"));

/// Format a memory entry line: `- <text> (YYYY-MM-DD) #tag…`.
pub fn format_memory_entry(text: &str, tags: &[String], date: NaiveDate) -> String {
    let mut line = format!("- {} ({})", text.trim(), date.format("%Y-%m-%d"));
    for tag in tags {
        line.push_str(&format!(" #{tag}"));
    }
    line
}

/// Parse an entry line back into its parts. Returns `(text, date, tags)`.
pub fn parse_memory_entry(line: &str) -> Option<(String, String, Vec<String>)> {
    let caps = ENTRY_RE.captures(line.trim_end())?;
    let text = caps.name("text")?.as_str().to_string();
    let date = caps.name("date")?.as_str().to_string();
    let tags = TAG_RE
        .captures_iter(caps.name("tags").map(|m| m.as_str()).unwrap_or(""))
        .map(|c| c[1].to_string())
        .collect();
    Some((text, date, tags))
}

/// Pull embedded hashtags out of a fact, returning the cleaned fact and
/// the extracted tags.
pub fn extract_tags(fact: &str) -> (String, Vec<String>) {
    let tags: Vec<String> = TAG_RE
        .captures_iter(fact)
        .map(|c| c[1].to_string())
        .collect();
    let clean = TAG_RE.replace_all(fact, "").to_string();
    let clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    (clean, tags)
}

/// Pick a category from keywords when the caller did not supply one.
pub fn detect_category(fact: &str) -> &'static str {
    let lower = fact.to_lowercase();
    const PREFERENCE_WORDS: &[&str] = &[
        "prefer", "like", "likes", "favorite", "always", "never", "hate", "want",
    ];
    const CONTEXT_WORDS: &[&str] = &[
        "project", "working on", "current", "task", "deadline", "branch",
    ];
    if PREFERENCE_WORDS.iter().any(|w| lower.contains(w)) {
        "Preferences"
    } else if CONTEXT_WORDS.iter().any(|w| lower.contains(w)) {
        "Context"
    } else {
        "Facts"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Markdown memory store bound to a global workspace directory and a
/// project directory.
pub struct MemoryStore {
    /// Directory holding the global `MEMORY.md` and the `memory/` logs.
    workspace_dir: PathBuf,
    /// Directory holding the project `MEMORY.md` (`<cwd>/.llamar`).
    project_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace_dir: &Path, project_dir: &Path) -> Self {
        Self {
            workspace_dir: workspace_dir.to_path_buf(),
            project_dir: project_dir.to_path_buf(),
        }
    }

    fn memory_path(&self, scope: MemoryScope) -> PathBuf {
        match scope {
            MemoryScope::Global => self.workspace_dir.join("MEMORY.md"),
            MemoryScope::Project => self.project_dir.join("MEMORY.md"),
        }
    }

    /// Append a fact to the scoped `MEMORY.md`, extracting embedded
    /// hashtags and auto-detecting the category when none is given.
    /// Returns the formatted entry line.
    pub fn store(
        &self,
        fact: &str,
        extra_tags: &[String],
        category: Option<&str>,
        scope: MemoryScope,
    ) -> Result<String> {
        let (clean, mut tags) = extract_tags(fact);
        if clean.is_empty() {
            return Err(Error::Other("memory fact is empty".into()));
        }
        for tag in extra_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        let category = category
            .map(str::to_string)
            .unwrap_or_else(|| detect_category(&clean).to_string());
        let entry = format_memory_entry(&clean, &tags, Local::now().date_naive());

        let path = self.memory_path(scope);
        let document = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => String::new(),
        };
        let updated = insert_entry(&document, &category, &entry);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, updated)?;

        self.append_daily(&entry)?;
        Ok(entry)
    }

    /// Append one line to today's log under `memory/YYYY-MM-DD.md`.
    pub fn append_daily(&self, entry: &str) -> Result<()> {
        let today = Local::now();
        let dir = self.workspace_dir.join("memory");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.md", today.format("%Y-%m-%d")));

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "# {}\n", today.format("%Y-%m-%d"))?;
        }
        writeln!(file, "[{}] {}", today.format("%H:%M"), entry)?;
        Ok(())
    }

    /// Scan one scope's memory file for entries matching `query`
    /// (case-insensitive substring-as-regex).
    pub fn search_scope(&self, query: &str, scope: MemoryScope) -> Result<Vec<MemoryHit>> {
        let pattern = Regex::new(&format!("(?i){}", regex::escape(query)))
            .map_err(|e| Error::Other(format!("bad search pattern: {e}")))?;

        let path = self.memory_path(scope);
        let document = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => return Ok(Vec::new()),
        };

        let mut hits = Vec::new();
        let mut section = String::new();
        for (idx, line) in document.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(heading) = trimmed.strip_prefix("## ") {
                section = heading.trim().to_string();
                continue;
            }
            if !pattern.is_match(line) {
                continue;
            }
            let (text, date, tags) = match parse_memory_entry(trimmed) {
                Some(parsed) => parsed,
                None => {
                    // Tolerate free-form lines the user added by hand.
                    let bare = trimmed.trim_start_matches("- ").to_string();
                    (bare, String::new(), Vec::new())
                }
            };
            hits.push(MemoryHit {
                text,
                tags,
                date: if date.is_empty() { None } else { Some(date) },
                section: section.clone(),
                scope,
                line: idx + 1,
                raw: line.to_string(),
            });
        }
        Ok(hits)
    }

    /// Search both scopes, project first.
    pub fn search(&self, query: &str) -> Result<Vec<MemoryHit>> {
        let mut hits = self.search_scope(query, MemoryScope::Project)?;
        hits.extend(self.search_scope(query, MemoryScope::Global)?);
        Ok(hits)
    }
}

/// Insert an entry at the tail of `## <category>`, creating the heading
/// (and the `# Memory` title) as needed. Section matching ignores case.
fn insert_entry(document: &str, category: &str, entry: &str) -> String {
    let mut lines: Vec<String> = document.lines().map(str::to_string).collect();

    if !lines.iter().any(|l| l.trim().starts_with("# ")) {
        let mut fresh = vec!["# Memory".to_string(), String::new()];
        fresh.append(&mut lines);
        lines = fresh;
    }

    let wanted = category.to_lowercase();
    let section_start = lines.iter().position(|l| {
        l.trim()
            .strip_prefix("## ")
            .map(|h| h.trim().to_lowercase() == wanted)
            .unwrap_or(false)
    });

    match section_start {
        Some(start) => {
            // Tail = last non-blank line before the next `## ` heading.
            let section_end = lines[start + 1..]
                .iter()
                .position(|l| l.trim_start().starts_with("## "))
                .map(|off| start + 1 + off)
                .unwrap_or(lines.len());
            let mut insert_at = section_end;
            while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            lines.insert(insert_at, entry.to_string());
        }
        None => {
            while lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.pop();
            }
            lines.push(String::new());
            lines.push(format!("## {category}"));
            lines.push(String::new());
            lines.push(entry.to_string());
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
