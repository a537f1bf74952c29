//! Registration of the built-in tool set.

use std::sync::Arc;

use llamar_skills::types::{handler_fn, ParamSpec, ParamType, Skill};
use llamar_skills::{ChatBackend, SkillRegistry};

use crate::memory_tools::MemoryService;
use crate::{chat, file_ops, git, memory_tools, script, shell};

/// Services the tool bodies close over at registration time.
pub struct ToolDeps {
    pub memory: Arc<MemoryService>,
    pub chat: Option<Arc<dyn ChatBackend>>,
}

/// Install every built-in skill into the registry.
pub fn register_builtins(registry: &SkillRegistry, deps: ToolDeps) {
    // ── Files ────────────────────────────────────────────────────────
    registry.register(Skill::new(
        "read_file",
        "Read a file's contents, optionally limited to the first N lines",
        vec![
            ParamSpec::required("path", ParamType::String, "Path to the file"),
            ParamSpec::optional("lines", ParamType::Integer, "Return only the first N lines"),
        ],
        handler_fn(file_ops::read_file),
    ));

    registry.register(
        Skill::new(
            "write_file",
            "Replace a file's contents",
            vec![
                ParamSpec::required("path", ParamType::String, "Path to the file"),
                ParamSpec::required("content", ParamType::String, "New file contents"),
            ],
            handler_fn(file_ops::write_file),
        )
        .with_preview(|args| {
            let bytes = args
                .get("content")
                .and_then(|c| c.as_str())
                .map(|c| c.len())
                .unwrap_or(0);
            let path = args.get("path").and_then(|p| p.as_str()).unwrap_or("?");
            Some(format!("would write {bytes} bytes to {path}"))
        }),
    );

    registry.register(Skill::new(
        "list_files",
        "List files in a directory, optionally filtered by a glob pattern",
        vec![
            ParamSpec::optional("path", ParamType::String, "Directory to list (default .)"),
            ParamSpec::optional("pattern", ParamType::String, "Glob filter, e.g. *.R"),
            ParamSpec::optional("recursive", ParamType::Boolean, "Recurse into subdirectories"),
        ],
        handler_fn(file_ops::list_files),
    ));

    registry.register(Skill::new(
        "grep_files",
        "Search file contents with a regex, reporting path:line: text",
        vec![
            ParamSpec::required("pattern", ParamType::String, "Regex to search for"),
            ParamSpec::optional("path", ParamType::String, "Directory to search (default .)"),
            ParamSpec::optional(
                "file_pattern",
                ParamType::String,
                "Glob for files to include (default *.R)",
            ),
        ],
        handler_fn(file_ops::grep_files),
    ));

    // ── Shell and scripts ────────────────────────────────────────────
    registry.register(
        Skill::new(
            "bash",
            "Run a shell command and return its merged output",
            vec![
                ParamSpec::required("command", ParamType::String, "Command line to execute"),
                ParamSpec::optional("timeout", ParamType::Integer, "Timeout in seconds (default 30)"),
            ],
            handler_fn(shell::bash),
        )
        .with_preview(|args| {
            args.get("command")
                .and_then(|c| c.as_str())
                .map(|c| format!("would run: {c}"))
        }),
    );

    registry.register(Skill::new(
        "run_r",
        "Evaluate R code with Rscript and return the captured output",
        vec![
            ParamSpec::required("code", ParamType::String, "R code to evaluate"),
            ParamSpec::optional("timeout", ParamType::Integer, "Timeout in seconds (default 30)"),
        ],
        handler_fn(script::run_r),
    ));

    // ── Git ──────────────────────────────────────────────────────────
    registry.register(Skill::new(
        "git_status",
        "Show the working tree status of a repository",
        vec![ParamSpec::optional(
            "repo_path",
            ParamType::String,
            "Repository path (default .)",
        )],
        handler_fn(git::git_status),
    ));

    registry.register(Skill::new(
        "git_diff",
        "Show unstaged (or staged) changes in a repository",
        vec![
            ParamSpec::optional("repo_path", ParamType::String, "Repository path (default .)"),
            ParamSpec::optional("staged", ParamType::Boolean, "Show staged changes instead"),
        ],
        handler_fn(git::git_diff),
    ));

    registry.register(Skill::new(
        "git_log",
        "Show recent commits in a repository",
        vec![
            ParamSpec::optional("repo_path", ParamType::String, "Repository path (default .)"),
            ParamSpec::optional("count", ParamType::Integer, "Number of commits (default 10)"),
        ],
        handler_fn(git::git_log),
    ));

    // ── Memory ───────────────────────────────────────────────────────
    let memory = deps.memory.clone();
    registry.register(Skill::new(
        "memory_store",
        "Store a fact in long-term memory; hashtags become tags",
        vec![
            ParamSpec::required("fact", ParamType::String, "The fact to remember"),
            ParamSpec::optional("scope", ParamType::String, "Where to store it")
                .with_enum(&["project", "global"]),
            ParamSpec::optional("category", ParamType::String, "Section override"),
            ParamSpec::optional("tags", ParamType::Array, "Extra tags"),
        ],
        handler_fn(move |ctx, args| {
            let memory = memory.clone();
            async move { memory_tools::memory_store(memory, ctx, args).await }
        }),
    ));

    let memory = deps.memory;
    registry.register(Skill::new(
        "memory_search",
        "Search stored memories and indexed documents",
        vec![
            ParamSpec::required("query", ParamType::String, "What to look for"),
            ParamSpec::optional("scope", ParamType::String, "Limit to one scope")
                .with_enum(&["project", "global"]),
        ],
        handler_fn(move |ctx, args| {
            let memory = memory.clone();
            async move { memory_tools::memory_search(memory, ctx, args).await }
        }),
    ));

    // ── Chat ─────────────────────────────────────────────────────────
    let backend = deps.chat;
    registry.register(Skill::new(
        "chat",
        "Send a message to the language model and return its reply",
        vec![ParamSpec::required(
            "message",
            ParamType::String,
            "Message for the model",
        )],
        handler_fn(move |ctx, args| {
            let backend = backend.clone();
            async move { chat::chat(backend, ctx, args).await }
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamar_memory::{MemoryIndex, MemoryStore};

    fn registry_with_builtins() -> (tempfile::TempDir, SkillRegistry) {
        let tmp = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::new();
        register_builtins(
            &registry,
            ToolDeps {
                memory: Arc::new(MemoryService {
                    store: MemoryStore::new(
                        &tmp.path().join("ws"),
                        &tmp.path().join("proj"),
                    ),
                    index: Some(MemoryIndex::open_in_memory().unwrap()),
                }),
                chat: None,
            },
        );
        (tmp, registry)
    }

    #[test]
    fn core_tools_are_registered() {
        let (_tmp, registry) = registry_with_builtins();
        for name in [
            "read_file",
            "write_file",
            "list_files",
            "grep_files",
            "bash",
            "run_r",
            "git_status",
            "git_diff",
            "git_log",
            "memory_store",
            "memory_search",
            "chat",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn schemas_declare_required_params() {
        let (_tmp, registry) = registry_with_builtins();
        let defs = registry.list(None);
        let bash = defs.iter().find(|d| d.name == "bash").unwrap();
        assert_eq!(bash.input_schema["required"][0], "command");
        let write = defs.iter().find(|d| d.name == "write_file").unwrap();
        let required = write.input_schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
    }

    #[test]
    fn previews_are_attached() {
        let (_tmp, registry) = registry_with_builtins();
        let write = registry.get("write_file").unwrap();
        let hint = write.preview.as_ref().unwrap()(&serde_json::json!({
            "path": "a.txt", "content": "12345"
        }))
        .unwrap();
        assert_eq!(hint, "would write 5 bytes to a.txt");

        let bash = registry.get("bash").unwrap();
        let hint = bash.preview.as_ref().unwrap()(&serde_json::json!({
            "command": "echo hi"
        }))
        .unwrap();
        assert_eq!(hint, "would run: echo hi");
    }
}
