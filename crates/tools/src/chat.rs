//! The `chat` tool body: relay a message to the configured LLM backend.
//!
//! The backend is the out-of-scope HTTP client; it reaches the core only
//! through the [`ChatBackend`] trait. Subagents are queried through this
//! same tool over MCP.

use std::sync::Arc;

use serde_json::Value;

use llamar_domain::envelope::ToolResult;
use llamar_skills::{ChatBackend, SkillContext};

pub async fn chat(
    backend: Option<Arc<dyn ChatBackend>>,
    _ctx: Arc<SkillContext>,
    args: Value,
) -> ToolResult {
    let message = args
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if message.trim().is_empty() {
        return ToolResult::error("Message is empty");
    }

    let Some(backend) = backend else {
        return ToolResult::error("No chat backend configured");
    };

    match backend.send(message).await {
        Ok(reply) => ToolResult::ok(reply),
        Err(e) => ToolResult::error(format!("Chat failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llamar_domain::config::Config;
    use llamar_domain::Result;
    use serde_json::json;
    use std::path::PathBuf;

    struct UpperBackend;

    #[async_trait]
    impl ChatBackend for UpperBackend {
        async fn send(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_uppercase())
        }
    }

    fn ctx() -> Arc<SkillContext> {
        Arc::new(SkillContext::detached(
            Arc::new(Config::default()),
            PathBuf::from("/tmp"),
        ))
    }

    #[tokio::test]
    async fn relays_through_backend() {
        let result = chat(
            Some(Arc::new(UpperBackend)),
            ctx(),
            json!({"message": "hello"}),
        )
        .await;
        assert_eq!(result.text(), "HELLO");
    }

    #[tokio::test]
    async fn missing_backend_is_error() {
        let result = chat(None, ctx(), json!({"message": "hello"})).await;
        assert!(result.is_error);
        assert!(result.text().contains("No chat backend"));
    }
}
