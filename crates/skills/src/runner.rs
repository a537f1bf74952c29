//! The skill runner state machine:
//!
//! ```text
//! CALLED → VALIDATE_REQUIRED → VALIDATE_TYPES → (dry_run?) → EXECUTE → TRACE → RETURN
//!                         ↘ FAIL ↗           ↘ PREVIEW ↗       ↘ ERROR ↗
//! ```
//!
//! Timeouts are first-class outcomes, not exceptions: the handler runs in
//! its own task under `tokio::time::timeout`, a panic becomes an error
//! envelope carrying the cause, and expiry yields a timeout envelope
//! within T + ε.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::context::SkillContext;
use crate::schema::{dry_run_preview, validate_required, validate_types};
use crate::types::Skill;
use llamar_domain::envelope::ToolResult;
use llamar_domain::trace::TraceEvent;
use llamar_sessions::TraceEntry;

/// Per-call knobs the transport layer supplies.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub dry_run: bool,
    /// Who approved an `ask`-gated call, for trace provenance.
    pub approved_by: Option<String>,
}

impl RunOptions {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            dry_run: false,
            approved_by: None,
        }
    }
}

/// Shorten a string for previews and traces.
pub fn shorten(text: &str, max: usize) -> String {
    llamar_sessions::trace_log::truncate(text, max)
}

/// Execute one skill call end to end.
pub async fn run_skill(
    skill: Arc<Skill>,
    ctx: Arc<SkillContext>,
    args: Value,
    opts: RunOptions,
) -> ToolResult {
    // VALIDATE_REQUIRED
    if let Err(message) = validate_required(&skill, &args) {
        return trace_and_return(&skill, &ctx, &args, ToolResult::error(message), 0, &opts).await;
    }
    // VALIDATE_TYPES
    if let Err(message) = validate_types(&skill, &args) {
        return trace_and_return(&skill, &ctx, &args, ToolResult::error(message), 0, &opts).await;
    }

    // PREVIEW
    if opts.dry_run {
        let preview = dry_run_preview(&skill, &args);
        return trace_and_return(&skill, &ctx, &args, ToolResult::ok(preview), 0, &opts).await;
    }

    // EXECUTE
    let started = Instant::now();
    let handler = skill.handler.clone();
    let handler_ctx = ctx.clone();
    let handler_args = args.clone();
    let task =
        tokio::spawn(async move { handler.call(handler_ctx, handler_args).await });

    let result = match tokio::time::timeout(opts.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let cause = if join_error.is_panic() {
                match join_error.into_panic().downcast::<String>() {
                    Ok(message) => *message,
                    Err(payload) => match payload.downcast::<&'static str>() {
                        Ok(message) => (*message).to_string(),
                        Err(_) => "handler panicked".to_string(),
                    },
                }
            } else {
                "handler was cancelled".to_string()
            };
            tracing::error!(skill = %skill.name, cause = %cause, "skill handler failed");
            ToolResult::error(cause)
        }
        Err(_) => {
            let secs = opts.timeout.as_secs();
            TraceEvent::SkillTimedOut {
                skill: skill.name.clone(),
                timeout_secs: secs,
            }
            .emit();
            ToolResult::error(format!("Skill timed out after {secs} seconds"))
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    trace_and_return(&skill, &ctx, &args, result, elapsed_ms, &opts).await
}

/// TRACE → RETURN. The trace write is best-effort; its failure never
/// affects the returned value.
async fn trace_and_return(
    skill: &Skill,
    ctx: &SkillContext,
    args: &Value,
    result: ToolResult,
    elapsed_ms: u64,
    opts: &RunOptions,
) -> ToolResult {
    TraceEvent::SkillInvoked {
        skill: skill.name.clone(),
        success: !result.is_error,
        elapsed_ms,
    }
    .emit();

    if ctx.session_id.is_some() {
        if let Some(traces) = &ctx.traces {
            let entry = TraceEntry::record(
                &skill.name,
                ctx.turn,
                args,
                result.text(),
                !result.is_error,
                elapsed_ms,
                opts.approved_by.clone(),
            );
            if let Err(e) = traces.add(&entry) {
                tracing::warn!(skill = %skill.name, error = %e, "trace append failed");
            }
        }
    }

    result
}
