//! Thin wrappers over the git CLI: status, diff, log.

use std::sync::Arc;

use serde_json::Value;

use crate::shell::run_in_shell;
use llamar_domain::envelope::ToolResult;
use llamar_policy::validate_path;
use llamar_skills::SkillContext;

const GIT_TIMEOUT_SECS: u64 = 30;

async fn run_git(ctx: &SkillContext, args: &Value, subcommand: &str) -> ToolResult {
    let repo = args
        .get("repo_path")
        .and_then(|v| v.as_str())
        .unwrap_or(".");
    let resolved = match validate_path(repo, &ctx.config, &ctx.cwd, "read") {
        Ok(p) => p,
        Err(message) => return ToolResult::error(message),
    };
    run_in_shell(&format!("git {subcommand}"), GIT_TIMEOUT_SECS, Some(&resolved)).await
}

/// `git_status(repo_path?)`
pub async fn git_status(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    run_git(&ctx, &args, "status --short --branch").await
}

/// `git_diff(repo_path?, staged?)`
pub async fn git_diff(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let staged = args
        .get("staged")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let subcommand = if staged { "diff --cached" } else { "diff" };
    run_git(&ctx, &args, subcommand).await
}

/// `git_log(repo_path?, count?)`
pub async fn git_log(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(10);
    run_git(&ctx, &args, &format!("log --oneline -n {count}")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamar_domain::config::Config;
    use serde_json::json;

    #[tokio::test]
    async fn denied_repo_path_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.denied_paths = vec![tmp.path().to_string_lossy().to_string()];
        let ctx = Arc::new(SkillContext::detached(
            Arc::new(cfg),
            tmp.path().to_path_buf(),
        ));

        let result = git_status(ctx, json!({"repo_path": "."})).await;
        assert!(result.is_error);
        assert!(result.text().contains("restricted"));
    }

    #[tokio::test]
    async fn non_repo_failure_is_llm_visible() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Arc::new(SkillContext::detached(
            Arc::new(Config::default()),
            tmp.path().to_path_buf(),
        ));
        // Either git is missing or the directory is not a repository;
        // both surface as Ok text beginning with "Error:".
        let result = git_status(ctx, json!({})).await;
        assert!(!result.is_error);
        assert!(result.text().starts_with("Error:"));
    }
}
