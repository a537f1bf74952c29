//! Shared server state composed at startup.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use llamar_domain::config::Config;
use llamar_policy::ApprovalHook;
use llamar_sessions::{SessionStore, Transcript};
use llamar_skills::SkillRegistry;

use crate::rate::RateLimiter;
use crate::subagent::SubagentManager;

pub struct ServerState {
    pub config: Arc<Config>,
    pub registry: Arc<SkillRegistry>,
    pub sessions: Arc<SessionStore>,
    pub transcript: Arc<Transcript>,
    pub rate: Arc<RateLimiter>,
    pub subagents: Arc<SubagentManager>,
    /// Confirmation callback for `ask`-gated tools; absent on headless
    /// servers, where `ask` degrades to deny.
    pub approval: Option<Arc<dyn ApprovalHook>>,
    /// Optional allow-set restricting `tools/list` and `tools/call`
    /// (used for subagents' default tool sets).
    pub allowed_tools: Option<HashSet<String>>,
    pub agent_id: String,
    pub cwd: PathBuf,
    /// True when this process was spawned as a subagent.
    pub is_subagent: bool,
}

impl ServerState {
    /// Whether a tool is visible through this server's allow-set.
    pub fn tool_allowed(&self, name: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|set| set.contains(name))
    }
}
