// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Permission-gated subprocess execution with bounded output capture and
//! a timeout (spec 4.H steps 3-6).
use std::process::Stdio;
use std::time::Duration;

use tinyagi_repository::{Repository, TrustClass};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::Result;

const CURATED_TOOLS: [&str; 2] = ["git", "docker"];

fn trust_class_for(tool: &str) -> TrustClass {
    if CURATED_TOOLS.contains(&tool) {
        TrustClass::Curated
    } else {
        TrustClass::Mainstream
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub output: String,
    pub truncated: bool,
}

pub enum ExecOutcome {
    Completed(ExecutionResult),
    NeedsApproval { request_id: String, instruction: String },
}

/// Truncate `bytes` to `cap` bytes, appending a marker when it overflowed.
fn cap_output(stdout: &[u8], stderr: &[u8], cap: usize) -> (String, bool) {
    let mut combined = Vec::with_capacity(stdout.len() + stderr.len() + 16);
    combined.extend_from_slice(stdout);
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.extend_from_slice(b"\n");
        }
        combined.extend_from_slice(b"[stderr]\n");
        combined.extend_from_slice(stderr);
    }
    let truncated = combined.len() > cap;
    if truncated {
        combined.truncate(cap);
    }
    (String::from_utf8_lossy(&combined).to_string(), truncated)
}

/// Execute `argv` after checking/creating the `execute` permission for
/// `user_id`. Registers the tool row if unseen, spawns with no shell and
/// inherited env, caps output at `output_cap_bytes`, and kills with
/// SIGTERM (falling back to SIGKILL) after `timeout_secs`.
pub async fn execute(repo: &Repository, run_id: &str, user_id: &str, argv: &[String], timeout_secs: u64, output_cap_bytes: usize) -> Result<ExecOutcome> {
    let tool_name = argv[0].clone();
    repo.register_tool_if_new(&tool_name, "builtin-allowlist", trust_class_for(&tool_name))?;

    if repo.find_active_permission(user_id, &tool_name, "execute")?.is_none() {
        let request_id = repo.request_permission(user_id, &tool_name, "execute", None)?;
        return Ok(ExecOutcome::NeedsApproval {
            instruction: format!("approval needed to run `{tool_name}`; approve request {request_id} to continue"),
            request_id,
        });
    }

    repo.append_event(run_id, "execute_start", serde_json::json!({ "tool": tool_name, "argv": argv }))
        .ok();

    let started = std::time::Instant::now();
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

    let mut child = cmd.spawn().map_err(crate::error::ToolingError::Io)?;
    let mut stdout_reader = BufReader::new(child.stdout.take().expect("stdout piped"));
    let mut stderr_reader = BufReader::new(child.stderr.take().expect("stderr piped"));

    let wait_fut = async {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let _ = stdout_reader.read_to_end(&mut stdout_buf).await;
        let _ = stderr_reader.read_to_end(&mut stderr_buf).await;
        let status = child.wait().await;
        (status, stdout_buf, stderr_buf)
    };

    let timed_out = tokio::time::timeout(Duration::from_secs(timeout_secs), wait_fut).await;

    let (status, stdout_buf, stderr_buf) = match timed_out {
        Ok(result) => result,
        Err(_) => {
            terminate(&child);
            let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
            (Ok(std::process::ExitStatus::default()), Vec::new(), Vec::new())
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let (body, truncated) = cap_output(&stdout_buf, &stderr_buf, output_cap_bytes);
    let exit_code = status.ok().and_then(|s| s.code());

    let exit_label = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "timeout".to_string());
    let output = format!("Exit code: {exit_label} (took {duration_ms}ms)\n{body}");

    let kind = if exit_code == Some(0) { "execute_success" } else { "execute_failed" };
    repo.append_event(run_id, kind, serde_json::json!({ "tool": tool_name, "exit_code": exit_code, "duration_ms": duration_ms }))
        .ok();

    Ok(ExecOutcome::Completed(ExecutionResult { exit_code, duration_ms, output, truncated }))
}

#[cfg(unix)]
fn terminate(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_class_curated_for_git_and_docker() {
        assert_eq!(trust_class_for("git"), TrustClass::Curated);
        assert_eq!(trust_class_for("docker"), TrustClass::Curated);
        assert_eq!(trust_class_for("npm"), TrustClass::Mainstream);
    }

    #[test]
    fn cap_output_truncates_when_over_budget() {
        let stdout = vec![b'a'; 100];
        let (out, truncated) = cap_output(&stdout, &[], 10);
        assert_eq!(out.len(), 10);
        assert!(truncated);
    }

    #[test]
    fn cap_output_appends_stderr_section() {
        let (out, truncated) = cap_output(b"ok", b"oops", 1024);
        assert!(out.contains("[stderr]"));
        assert!(!truncated);
    }

    fn seed_run(repo: &Repository, run_id: &str) {
        repo.create_run(run_id, "task_1", "whatsapp", "alice", None, None, None, "objective", tinyagi_repository::RiskLevel::Low, "alpha").unwrap();
    }

    #[tokio::test]
    async fn execute_requests_approval_when_permission_absent() {
        let repo = Repository::open_in_memory().unwrap();
        seed_run(&repo, "run_1");
        let argv = vec!["git".to_string(), "status".to_string()];
        let outcome = execute(&repo, "run_1", "u1", &argv, 30, 1024).await.unwrap();
        assert!(matches!(outcome, ExecOutcome::NeedsApproval { .. }));
    }

    #[tokio::test]
    async fn execute_runs_once_permission_granted() {
        let repo = Repository::open_in_memory().unwrap();
        seed_run(&repo, "run_1");
        repo.grant_permission("u1", "echo", "execute", None).unwrap();
        let argv = vec!["echo".to_string(), "hi".to_string()];
        let outcome = execute(&repo, "run_1", "u1", &argv, 30, 1024).await.unwrap();
        match outcome {
            ExecOutcome::Completed(result) => {
                assert_eq!(result.exit_code, Some(0));
                assert!(result.output.starts_with("Exit code: 0"));
                assert!(result.output.contains("hi"));
            }
            ExecOutcome::NeedsApproval { .. } => panic!("expected completion"),
        }
    }
}
