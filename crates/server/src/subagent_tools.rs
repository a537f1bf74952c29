//! Registry skills exposing the subagent supervisor: spawn, query, list,
//! and kill delegated child servers.

use std::sync::Arc;

use serde_json::Value;

use llamar_domain::envelope::ToolResult;
use llamar_skills::types::{handler_fn, ParamSpec, ParamType, Skill};
use llamar_skills::SkillRegistry;

use crate::subagent::SubagentManager;

pub fn register_subagent_tools(registry: &SkillRegistry, manager: Arc<SubagentManager>) {
    let spawn_manager = manager.clone();
    registry.register(Skill::new(
        "subagent_spawn",
        "Start a child tool server for a delegated task; returns its id",
        vec![ParamSpec::required(
            "task",
            ParamType::String,
            "What the subagent should work on",
        )],
        handler_fn(move |ctx, args: Value| {
            let manager = spawn_manager.clone();
            async move {
                let task = args.get("task").and_then(|t| t.as_str()).unwrap_or_default();
                match manager.spawn(task, &ctx.cwd).await {
                    Ok(record) => ToolResult::ok(format!(
                        "Subagent {} started on port {} for: {}",
                        record.id, record.port, record.task
                    )),
                    Err(e) => ToolResult::error(e.to_string()),
                }
            }
        }),
    ));

    let query_manager = manager.clone();
    registry.register(Skill::new(
        "subagent_query",
        "Send a message to a running subagent and return its reply",
        vec![
            ParamSpec::required("id", ParamType::String, "Subagent id"),
            ParamSpec::required("message", ParamType::String, "Message to send"),
        ],
        handler_fn(move |_, args: Value| {
            let manager = query_manager.clone();
            async move {
                let id = args.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                let message = args
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                match manager.query(id, message).await {
                    Ok(reply) => ToolResult::ok(reply),
                    Err(e) => ToolResult::error(e.to_string()),
                }
            }
        }),
    ));

    let list_manager = manager.clone();
    registry.register(Skill::new(
        "subagent_list",
        "List running subagents",
        vec![],
        handler_fn(move |_, _| {
            let manager = list_manager.clone();
            async move {
                let records = manager.list();
                if records.is_empty() {
                    return ToolResult::ok("No subagents running");
                }
                let lines: Vec<String> = records
                    .iter()
                    .map(|r| format!("{} (port {}): {}", r.id, r.port, r.task))
                    .collect();
                ToolResult::ok(lines.join("\n"))
            }
        }),
    ));

    registry.register(Skill::new(
        "subagent_kill",
        "Stop a running subagent",
        vec![ParamSpec::required("id", ParamType::String, "Subagent id")],
        handler_fn(move |_, args: Value| {
            let manager = manager.clone();
            async move {
                let id = args.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                match manager.kill(id).await {
                    Ok(()) => ToolResult::ok(format!("Subagent {id} stopped")),
                    Err(e) => ToolResult::error(e.to_string()),
                }
            }
        }),
    ));
}
