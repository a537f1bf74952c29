//! Merged configuration model.
//!
//! Two JSON files feed the resolver: `~/.llamar/config.json` (global) and
//! `<cwd>/.llamar/config.json` (project). Each file that parses cleanly
//! becomes a JSON object; the two are shallow-merged with project
//! precedence, then hard-coded defaults fill any missing key. A malformed
//! file is replaced with `{}`; the resolver warns but never aborts
//! startup.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gate applied to a tool: run, confirm first, or refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Allow,
    Ask,
    Deny,
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalMode::Allow => write!(f, "allow"),
            ApprovalMode::Ask => write!(f, "ask"),
            ApprovalMode::Deny => write!(f, "deny"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Windowed caps for one LLM provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub tokens_per_hour: Option<u64>,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

/// Child tool-server policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "d_subagents_enabled")]
    pub enabled: bool,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "d_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default)]
    pub allow_nested: bool,
    #[serde(default = "d_default_tools")]
    pub default_tools: Vec<String>,
    #[serde(default = "d_base_port")]
    pub base_port: u16,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            enabled: d_subagents_enabled(),
            max_concurrent: d_max_concurrent(),
            timeout_minutes: d_timeout_minutes(),
            allow_nested: false,
            default_tools: d_default_tools(),
            base_port: d_base_port(),
        }
    }
}

fn d_subagents_enabled() -> bool {
    true
}
fn d_max_concurrent() -> usize {
    3
}
fn d_timeout_minutes() -> u64 {
    30
}
fn d_default_tools() -> Vec<String> {
    ["read_file", "list_files", "grep_files", "chat"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn d_base_port() -> u16 {
    8700
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default LLM identity stored with new sessions.
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_model")]
    pub model: String,

    /// Ordered list of filenames to look for in the project root.
    #[serde(default = "d_context_files")]
    pub context_files: Vec<String>,

    /// Default gate for tools listed in `dangerous_tools`.
    #[serde(default = "d_approval_mode")]
    pub approval_mode: ApprovalMode,
    #[serde(default = "d_dangerous_tools")]
    pub dangerous_tools: Vec<String>,
    /// Per-tool override of the default gate.
    #[serde(default)]
    pub permissions: HashMap<String, ApprovalMode>,

    /// If non-empty, filesystem access must lie under one entry.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// Always-forbidden path prefixes; take precedence over allowed.
    #[serde(default)]
    pub denied_paths: Vec<String>,

    /// Default per-call timeout in seconds.
    #[serde(default = "d_skill_timeout")]
    pub skill_timeout: u64,
    /// If true, skills are validated but not executed.
    #[serde(default)]
    pub dry_run: bool,

    /// Windowed caps keyed by provider name.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    #[serde(default)]
    pub subagents: SubagentConfig,

    /// Context-usage thresholds (percent) for UI warnings and compaction.
    #[serde(default = "d_context_warn_pct")]
    pub context_warn_pct: u8,
    #[serde(default = "d_context_high_pct")]
    pub context_high_pct: u8,
    #[serde(default = "d_context_crit_pct")]
    pub context_crit_pct: u8,
    #[serde(default = "d_context_compact_pct")]
    pub context_compact_pct: u8,
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Map::new()))
            .expect("empty object satisfies all config defaults")
    }
}

fn d_provider() -> String {
    "openai".into()
}
fn d_model() -> String {
    "gpt-4o".into()
}
fn d_context_files() -> Vec<String> {
    vec!["LLAMAR.md".into(), "README.md".into()]
}
fn d_approval_mode() -> ApprovalMode {
    ApprovalMode::Ask
}
fn d_dangerous_tools() -> Vec<String> {
    vec!["bash".into(), "run_r".into(), "write_file".into()]
}
fn d_skill_timeout() -> u64 {
    60
}
fn d_context_warn_pct() -> u8 {
    70
}
fn d_context_high_pct() -> u8 {
    85
}
fn d_context_crit_pct() -> u8 {
    95
}
fn d_context_compact_pct() -> u8 {
    90
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The llamar home directory (`~/.llamar`), or a cwd-relative fallback
/// when no home directory can be determined.
pub fn llamar_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".llamar")
}

/// Read one config file into a JSON object. Missing files and malformed
/// JSON both yield an empty object; the latter logs a warning.
fn load_object(path: &Path) -> Map<String, Value> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Map::new(),
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "config file is not a JSON object, ignoring");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed config file, ignoring");
            Map::new()
        }
    }
}

/// Shallow-merge `project` over `global` (project wins per top-level key).
fn shallow_merge(global: Map<String, Value>, project: Map<String, Value>) -> Map<String, Value> {
    let mut merged = global;
    for (key, value) in project {
        merged.insert(key, value);
    }
    merged
}

/// Resolve configuration from explicit global and project file paths.
///
/// Pure given the file contents: same inputs, same output. Keys missing
/// after the merge are filled with hard-coded defaults.
pub fn resolve_from(global_path: &Path, project_path: &Path) -> Config {
    let merged = shallow_merge(load_object(global_path), load_object(project_path));
    match serde_json::from_value(Value::Object(merged)) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "merged config did not deserialize, using defaults");
            Config::default()
        }
    }
}

/// Resolve configuration for a working directory using the standard
/// locations: `~/.llamar/config.json` and `<cwd>/.llamar/config.json`.
pub fn resolve(cwd: &Path) -> Config {
    let global = llamar_home().join("config.json");
    let project = cwd.join(".llamar").join("config.json");
    resolve_from(&global, &project)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.approval_mode, ApprovalMode::Ask);
        assert_eq!(cfg.skill_timeout, 60);
        assert!(!cfg.dry_run);
        assert!(cfg.allowed_paths.is_empty());
        assert_eq!(cfg.subagents.max_concurrent, 3);
        assert_eq!(cfg.context_compact_pct, 90);
        assert!(cfg.dangerous_tools.contains(&"bash".to_string()));
    }

    #[test]
    fn project_wins_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let project = dir.path().join("project.json");
        write(&global, r#"{"model":"gpt-4o","skill_timeout":120}"#);
        write(&project, r#"{"model":"o3-mini"}"#);

        let cfg = resolve_from(&global, &project);
        assert_eq!(cfg.model, "o3-mini");
        assert_eq!(cfg.skill_timeout, 120);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let project = dir.path().join("project.json");
        write(&global, "{not json at all");
        write(&project, r#"{"provider":"anthropic"}"#);

        let cfg = resolve_from(&global, &project);
        assert_eq!(cfg.provider, "anthropic");
        assert_eq!(cfg.model, "gpt-4o");
    }

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = resolve_from(
            &dir.path().join("nope.json"),
            &dir.path().join("also-nope.json"),
        );
        assert_eq!(cfg.provider, "openai");
    }

    #[test]
    fn resolver_is_pure() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("g.json");
        let project = dir.path().join("p.json");
        write(&global, r#"{"dangerous_tools":["bash"]}"#);
        write(&project, r#"{"approval_mode":"deny"}"#);

        let a = resolve_from(&global, &project);
        let b = resolve_from(&global, &project);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn permissions_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("p.json");
        write(&project, r#"{"permissions":{"bash":"deny","chat":"allow"}}"#);

        let cfg = resolve_from(&dir.path().join("g.json"), &project);
        assert_eq!(cfg.permissions.get("bash"), Some(&ApprovalMode::Deny));
        assert_eq!(cfg.permissions.get("chat"), Some(&ApprovalMode::Allow));
    }

    #[test]
    fn rate_limits_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("p.json");
        write(
            &project,
            r#"{"rate_limits":{"openai":{"tokens_per_hour":100000,"requests_per_minute":20}}}"#,
        );

        let cfg = resolve_from(&dir.path().join("g.json"), &project);
        let rl = cfg.rate_limits.get("openai").unwrap();
        assert_eq!(rl.tokens_per_hour, Some(100_000));
        assert_eq!(rl.requests_per_minute, Some(20));
    }
}
