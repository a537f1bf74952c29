//! The `run_r` tool body: execute an R expression or script string via
//! `Rscript`, with the same Ok-with-error-text convention as `bash`.

use std::sync::Arc;

use serde_json::Value;

use crate::shell::run_in_shell;
use llamar_domain::envelope::ToolResult;
use llamar_skills::SkillContext;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Run a code string with `Rscript --vanilla -e`.
pub async fn run_r(ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let code = args
        .get("code")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if code.trim().is_empty() {
        return ToolResult::error("Code is empty");
    }

    let timeout_secs = args
        .get("timeout")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    // Single-quote for the shell; embedded quotes are escaped the POSIX way.
    let quoted = format!("'{}'", code.replace('\'', r#"'\''"#));
    let command = format!("Rscript --vanilla -e {quoted}");
    run_in_shell(&command, timeout_secs, Some(&ctx.cwd)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamar_domain::config::Config;
    use serde_json::json;
    use std::path::PathBuf;

    fn ctx() -> Arc<SkillContext> {
        Arc::new(SkillContext::detached(
            Arc::new(Config::default()),
            PathBuf::from("/tmp"),
        ))
    }

    #[tokio::test]
    async fn empty_code_is_error() {
        let result = run_r(ctx(), json!({"code": ""})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn missing_interpreter_stays_llm_visible() {
        // Whether or not Rscript is installed, the envelope is Ok: either
        // the evaluation output or an "Error:" diagnostic.
        let result = run_r(ctx(), json!({"code": "cat(2+2)"})).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn quoting_survives_embedded_quotes() {
        // Exercise the same quoting path through the shell itself.
        let code = "it's quoted";
        let quoted = format!("'{}'", code.replace('\'', r#"'\''"#));
        let result = run_in_shell(&format!("printf %s {quoted}"), 10, None).await;
        assert_eq!(result.text(), "it's quoted");
    }
}
