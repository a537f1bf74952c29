//! File tool bodies: read, write, list, grep.
//!
//! Every body validates its path against the configured allow/deny rules
//! before touching the filesystem. Writes land atomically (temp sibling,
//! then rename) so an interrupted call never leaves a torn file.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use walkdir::WalkDir;

use llamar_domain::envelope::ToolResult;
use llamar_policy::validate_path;
use llamar_skills::SkillContext;

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// `read_file(path, lines?)`: whole file, or the first `lines` lines.
pub async fn read_file(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let path = arg_str(&args, "path").unwrap_or_default();
    let resolved = match validate_path(path, &ctx.config, &ctx.cwd, "read") {
        Ok(p) => p,
        Err(message) => return ToolResult::error(message),
    };

    let content = match tokio::fs::read_to_string(&resolved).await {
        Ok(content) => content,
        Err(_) => {
            return ToolResult::error(format!("File not found: {}", resolved.display()))
        }
    };

    match args.get("lines").and_then(|v| v.as_u64()) {
        Some(n) => {
            let head: Vec<&str> = content.lines().take(n as usize).collect();
            ToolResult::ok(head.join("\n"))
        }
        None => ToolResult::ok(content),
    }
}

/// `write_file(path, content)`: replace the file, report bytes written.
pub async fn write_file(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let path = arg_str(&args, "path").unwrap_or_default();
    let content = arg_str(&args, "content").unwrap_or_default().to_string();
    let resolved = match validate_path(path, &ctx.config, &ctx.cwd, "write") {
        Ok(p) => p,
        Err(message) => return ToolResult::error(message),
    };

    if let Some(parent) = resolved.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return ToolResult::error(format!("Failed to create parent directory: {e}"));
        }
    }

    // Atomic replace: write a temp sibling, then rename into place.
    let tmp = resolved.with_extension("llamar.tmp");
    if let Err(e) = tokio::fs::write(&tmp, content.as_bytes()).await {
        return ToolResult::error(format!("Failed to write '{}': {e}", resolved.display()));
    }
    if let Err(e) = tokio::fs::rename(&tmp, &resolved).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return ToolResult::error(format!("Failed to write '{}': {e}", resolved.display()));
    }

    ToolResult::ok(format!(
        "Wrote {} bytes to {}",
        content.len(),
        resolved.display()
    ))
}

/// `list_files(path=".", pattern?, recursive?)`: newline-joined names.
pub async fn list_files(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let path = arg_str(&args, "path").unwrap_or(".");
    let resolved = match validate_path(path, &ctx.config, &ctx.cwd, "list") {
        Ok(p) => p,
        Err(message) => return ToolResult::error(message),
    };

    let pattern = match arg_str(&args, "pattern").map(glob::Pattern::new) {
        Some(Ok(p)) => Some(p),
        Some(Err(e)) => return ToolResult::error(format!("Bad pattern: {e}")),
        None => None,
    };
    let recursive = args
        .get("recursive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut names = Vec::new();
    if recursive {
        for entry in WalkDir::new(&resolved)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if pattern.as_ref().is_none_or(|p| p.matches(&name)) {
                let rel = entry
                    .path()
                    .strip_prefix(&resolved)
                    .unwrap_or(entry.path());
                names.push(rel.to_string_lossy().to_string());
            }
        }
    } else {
        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => {
                return ToolResult::error(format!(
                    "Cannot list '{}': {e}",
                    resolved.display()
                ))
            }
        };
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if pattern.as_ref().is_none_or(|p| p.matches(&name)) {
                names.push(name);
            }
        }
    }

    if names.is_empty() {
        return ToolResult::ok("No files found");
    }
    names.sort();
    ToolResult::ok(names.join("\n"))
}

/// `grep_files(pattern, path=".", file_pattern="*.R")`: `path:line: text`.
pub async fn grep_files(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    const MAX_MATCHES: usize = 200;

    let pattern = arg_str(&args, "pattern").unwrap_or_default();
    let re = match regex::Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => return ToolResult::error(format!("Bad pattern: {e}")),
    };

    let path = arg_str(&args, "path").unwrap_or(".");
    let resolved = match validate_path(path, &ctx.config, &ctx.cwd, "read") {
        Ok(p) => p,
        Err(message) => return ToolResult::error(message),
    };

    let file_pattern = arg_str(&args, "file_pattern").unwrap_or("*.R");
    let file_glob = match glob::Pattern::new(file_pattern) {
        Ok(p) => p,
        Err(e) => return ToolResult::error(format!("Bad file pattern: {e}")),
    };

    let mut matches = Vec::new();
    'files: for entry in WalkDir::new(&resolved).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !file_glob.matches(&name) {
            continue;
        }
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(_) => continue,
        };
        for (idx, line) in content.lines().enumerate() {
            if re.is_match(line) {
                let shown = display_path(entry.path(), &resolved);
                matches.push(format!("{shown}:{}: {}", idx + 1, line.trim_end()));
                if matches.len() >= MAX_MATCHES {
                    matches.push(format!("... (stopped at {MAX_MATCHES} matches)"));
                    break 'files;
                }
            }
        }
    }

    if matches.is_empty() {
        return ToolResult::ok("No matches found");
    }
    ToolResult::ok(matches.join("\n"))
}

fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
