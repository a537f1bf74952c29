//! Memory tool bodies over the Markdown store and the chunk index.

use std::sync::Arc;

use serde_json::Value;

use llamar_domain::envelope::ToolResult;
use llamar_memory::{MemoryIndex, MemoryScope, MemoryStore};
use llamar_skills::SkillContext;

/// Shared memory services captured by the tool handlers at registration.
pub struct MemoryService {
    pub store: MemoryStore,
    pub index: Option<MemoryIndex>,
}

fn parse_scope(args: &Value) -> Result<MemoryScope, String> {
    match args.get("scope").and_then(|v| v.as_str()) {
        None | Some("project") => Ok(MemoryScope::Project),
        Some("global") => Ok(MemoryScope::Global),
        Some(other) => Err(format!("Unknown scope '{other}': expected project or global")),
    }
}

/// `memory_store(fact, scope?, category?, tags?)`
pub async fn memory_store(
    service: Arc<MemoryService>,
    _ctx: Arc<SkillContext>,
    args: Value,
) -> ToolResult {
    let fact = args
        .get("fact")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if fact.trim().is_empty() {
        return ToolResult::error("Fact is empty");
    }
    let scope = match parse_scope(&args) {
        Ok(scope) => scope,
        Err(message) => return ToolResult::error(message),
    };
    let category = args.get("category").and_then(|v| v.as_str());
    let tags: Vec<String> = args
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    match service.store.store(fact, &tags, category, scope) {
        Ok(entry) => ToolResult::ok(format!("Remembered: {entry}")),
        Err(e) => ToolResult::error(format!("Failed to store memory: {e}")),
    }
}

/// `memory_search(query, scope?)`: Markdown hits first, then indexed
/// chunks when the index is mounted.
pub async fn memory_search(
    service: Arc<MemoryService>,
    _ctx: Arc<SkillContext>,
    args: Value,
) -> ToolResult {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if query.trim().is_empty() {
        return ToolResult::error("Query is empty");
    }

    let markdown_hits = match args.get("scope").and_then(|v| v.as_str()) {
        Some(_) => match parse_scope(&args) {
            Ok(scope) => service.store.search_scope(query, scope),
            Err(message) => return ToolResult::error(message),
        },
        None => service.store.search(query),
    };
    let markdown_hits = match markdown_hits {
        Ok(hits) => hits,
        Err(e) => return ToolResult::error(format!("Memory search failed: {e}")),
    };

    let mut lines = Vec::new();
    for hit in &markdown_hits {
        let date = hit.date.as_deref().unwrap_or("-");
        lines.push(format!(
            "[{:?}/{}] ({date}) {}",
            hit.scope, hit.section, hit.text
        ));
    }

    if let Some(index) = &service.index {
        if let Ok(chunks) = index.search_fts(query, 5, None) {
            for chunk in chunks {
                lines.push(format!(
                    "[index {}] {}",
                    chunk.id,
                    llamar_skills::runner::shorten(&chunk.text, 200)
                ));
            }
        }
    }

    if lines.is_empty() {
        return ToolResult::ok("No memories found");
    }
    ToolResult::ok(lines.join("\n"))
}
