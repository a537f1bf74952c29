//! Per-tool permission engine.
//!
//! The engine only decides; it never prompts. Interactive confirmation is
//! supplied by the caller through an [`ApprovalHook`]. A server running
//! without a hook treats `ask` as `deny`.

use async_trait::async_trait;
use serde_json::Value;

use llamar_domain::config::{ApprovalMode, Config};

/// The three-valued gate for a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run without prompting.
    Allow,
    /// Ask the user; refusal yields an error envelope.
    Ask,
    /// Refuse immediately, before any side effect.
    Deny,
}

impl From<ApprovalMode> for Decision {
    fn from(mode: ApprovalMode) -> Self {
        match mode {
            ApprovalMode::Allow => Decision::Allow,
            ApprovalMode::Ask => Decision::Ask,
            ApprovalMode::Deny => Decision::Deny,
        }
    }
}

/// Resolve the gate for a tool:
///
/// 1. an explicit `permissions[tool]` entry wins verbatim;
/// 2. otherwise membership in `dangerous_tools` applies `approval_mode`;
/// 3. otherwise the tool is allowed.
pub fn resolve(tool: &str, cfg: &Config) -> Decision {
    if let Some(mode) = cfg.permissions.get(tool) {
        return (*mode).into();
    }
    if cfg.dangerous_tools.iter().any(|t| t == tool) {
        return cfg.approval_mode.into();
    }
    Decision::Allow
}

/// External confirmation callback for `ask`-gated tools.
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    /// Return `true` to approve the call.
    async fn approve(&self, tool: &str, args: &Value) -> bool;
}
