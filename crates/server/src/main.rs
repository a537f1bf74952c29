use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use llamar_domain::config::{self, Config};
use llamar_memory::{MemoryIndex, MemoryStore};
use llamar_sessions::{SessionStore, Transcript};
use llamar_skills::{loader, SkillRegistry};
use llamar_tools::memory_tools::MemoryService;
use llamar_tools::{register_builtins, ToolDeps};

use llamar_server::rate::RateLimiter;
use llamar_server::scheduler::{run_daemon, ChatTaskRunner, TaskStore};
use llamar_server::shutdown::Shutdown;
use llamar_server::state::ServerState;
use llamar_server::subagent::SubagentManager;
use llamar_server::{socket, stdio};

const AGENT_ID: &str = "main";
const SCHEDULER_INTERVAL_SECS: u64 = 30;

/// Integration point for the out-of-scope LLM client. An embedding
/// application (the CLI REPL, a channel bridge) links its own binary and
/// wires a real backend here; the standalone server runs without one,
/// so the `chat` tool and prompt-driven tasks report the missing
/// backend instead of failing silently.
fn wire_chat_backend() -> Option<Arc<dyn llamar_skills::ChatBackend>> {
    None
}

/// Process arguments: an optional port (positive integer) and an
/// optional working directory, in either order.
fn parse_args() -> (Option<u16>, Option<PathBuf>) {
    let mut port = None;
    let mut cwd = None;
    for arg in std::env::args().skip(1) {
        if let Ok(n) = arg.parse::<u16>() {
            if n > 0 && port.is_none() {
                port = Some(n);
                continue;
            }
        }
        if cwd.is_none() {
            cwd = Some(PathBuf::from(arg));
        }
    }
    (port, cwd)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    // Structured JSON to stderr; stdout carries the JSON-RPC wire.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let (port, cwd_arg) = parse_args();
    let cwd = match cwd_arg {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("resolving working directory")?,
    };
    let is_subagent = std::env::var("LLAMAR_SUBAGENT").is_ok();

    tracing::info!(?port, cwd = %cwd.display(), is_subagent, "llamar server starting");

    // ── Config ───────────────────────────────────────────────────────
    let config: Arc<Config> = Arc::new(config::resolve(&cwd));
    let home = config::llamar_home();
    let workspace = home.join("workspace");

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&home.join("agents"), AGENT_ID)
            .context("initializing session store")?,
    );
    let transcript = Arc::new(Transcript::new(sessions.dir()));

    // ── Memory ───────────────────────────────────────────────────────
    let index = match MemoryIndex::open(&workspace.join("memory").join(format!("{AGENT_ID}.sqlite")))
    {
        Ok(index) => Some(index),
        Err(e) => {
            tracing::warn!(error = %e, "chunk index unavailable, memory search degraded");
            None
        }
    };
    let memory = Arc::new(MemoryService {
        store: MemoryStore::new(&workspace, &cwd.join(".llamar")),
        index,
    });

    // ── Skills ───────────────────────────────────────────────────────
    let chat_backend = wire_chat_backend();
    let registry = Arc::new(SkillRegistry::new());
    register_builtins(
        &registry,
        ToolDeps {
            memory: memory.clone(),
            chat: chat_backend.clone(),
        },
    );
    match loader::scan_skills(&home.join("skills")) {
        Ok(docs) => {
            let count = docs.len();
            for doc in docs {
                registry.register(doc.into_skill());
            }
            tracing::info!(builtin_and_user_skills = registry.len(), user_docs = count, "skills loaded");
        }
        Err(e) => tracing::warn!(error = %e, "user skill scan failed"),
    }

    // ── Rate limiter ─────────────────────────────────────────────────
    let rate = Arc::new(RateLimiter::new(config.rate_limits.clone()));

    // ── Subagents ────────────────────────────────────────────────────
    let subagents = Arc::new(SubagentManager::new(
        config.subagents.clone(),
        sessions.clone(),
        is_subagent,
    ));
    llamar_server::subagent_tools::register_subagent_tools(&registry, subagents.clone());

    // ── Scheduler ────────────────────────────────────────────────────
    let shutdown = Shutdown::new();
    let tasks = Arc::new(
        TaskStore::open(&workspace.join("tasks.sqlite")).context("opening task store")?,
    );
    if let Some(backend) = chat_backend {
        let runner = Arc::new(ChatTaskRunner { backend });
        tokio::spawn(run_daemon(
            tasks.clone(),
            runner,
            std::time::Duration::from_secs(SCHEDULER_INTERVAL_SECS),
            shutdown.clone(),
        ));
    } else {
        tracing::info!("no chat backend wired; scheduler daemon idle");
    }

    // Subagent cleanup sweep.
    tokio::spawn(subagents.clone().run_sweep(shutdown.clone()));

    // ── State + transport ────────────────────────────────────────────
    let allowed_tools = if is_subagent {
        Some(config.subagents.default_tools.iter().cloned().collect())
    } else {
        None
    };
    let state = Arc::new(ServerState {
        config: config.clone(),
        registry,
        sessions,
        transcript,
        rate,
        subagents,
        approval: None,
        allowed_tools,
        agent_id: AGENT_ID.into(),
        cwd,
        is_subagent,
    });

    let result = match port {
        Some(port) => {
            let shutdown_for_signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown_for_signal.cancel();
                }
            });
            socket::run_socket(state, port, shutdown.clone()).await
        }
        None => stdio::run_stdio(state).await,
    };

    shutdown.cancel();
    result.context("transport error")
}
