//! Per-call execution context shared with every skill handler.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use llamar_domain::config::Config;
use llamar_domain::Result;
use llamar_sessions::TraceLog;

/// Seam for the out-of-scope LLM client. The `chat` tool and the
/// scheduler's task runner speak to the model through this trait only.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<String>;
}

/// Context handed to skill handlers for one invocation.
pub struct SkillContext {
    pub config: Arc<Config>,
    /// Working directory all relative paths resolve against.
    pub cwd: PathBuf,
    pub agent_id: String,
    /// Owning session, when the call arrived through a connection.
    pub session_id: Option<String>,
    /// Turn counter within the connection, for trace provenance.
    pub turn: Option<u32>,
    /// Per-session trace log; `None` disables tracing for this call.
    pub traces: Option<Arc<TraceLog>>,
}

impl SkillContext {
    /// Context with no session attached (tests, scheduler-driven calls).
    pub fn detached(config: Arc<Config>, cwd: PathBuf) -> Self {
        Self {
            config,
            cwd,
            agent_id: "main".into(),
            session_id: None,
            turn: None,
            traces: None,
        }
    }
}
