//! The `bash` tool body.
//!
//! Failures are LLM-visible: a non-zero exit or an internal timeout comes
//! back as an Ok envelope whose text starts with `"Error:"`, so the model
//! can read the diagnostics and try again. Only the command screen
//! produces a true Error envelope, because nothing ran.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use llamar_domain::envelope::ToolResult;
use llamar_policy::validate_command;
use llamar_skills::SkillContext;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Run a command under `sh -c`, merging stdout and stderr.
pub async fn bash(_ctx: Arc<SkillContext>, args: Value) -> ToolResult {
    let command = args
        .get("command")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if command.trim().is_empty() {
        return ToolResult::error("Command is empty");
    }
    if let Err(message) = validate_command(command) {
        return ToolResult::error(message);
    }

    let timeout_secs = args
        .get("timeout")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    run_in_shell(command, timeout_secs, None).await
}

/// Shared spawn/capture loop for shell-backed tools.
pub(crate) async fn run_in_shell(
    command: &str,
    timeout_secs: u64,
    workdir: Option<&std::path::Path>,
) -> ToolResult {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return ToolResult::ok(format!("Error: failed to spawn shell: {e}")),
    };

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        child.wait_with_output(),
    )
    .await;

    match output {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&stderr);
            }
            let text = text.trim_end().to_string();

            if output.status.success() {
                ToolResult::ok(if text.is_empty() {
                    "(no output)".to_string()
                } else {
                    text
                })
            } else {
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                ToolResult::ok(format!("Error: command exited with status {code}\n{text}"))
            }
        }
        Ok(Err(e)) => ToolResult::ok(format!("Error: failed to read command output: {e}")),
        // kill_on_drop reaps the child when the future is dropped here.
        Err(_) => ToolResult::ok(format!(
            "Error: command timed out after {timeout_secs} seconds"
        )),
    }
}
