// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Runs a parsed step plan against a `BrowserCapability`, recording an
//! action + audit row per step and gating payment-related steps behind
//! approval (spec 4.I "Execution loop").
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinyagi_config::BrowserConfig;
use tinyagi_repository::{Repository, RiskLevel, TabStatus};
use tracing::{info, warn};

use crate::capability::BrowserCapability;
use crate::error::{BrowserError, Result};
use crate::plan::{is_payment_related, Step};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 350;
const MAX_ARTIFACTS: usize = 6;
const MAX_EXTRACTED_LINES: usize = 5;

const CHECKPOINT_NEEDLES: [&str; 6] = ["captcha", "recaptcha", "two-factor", "2fa", "verify it's you", "session expired"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed { artifacts: Vec<String>, extracted: Vec<String> },
    NeedsApproval { request_id: String },
    NeedsInput { guidance: String },
}

/// Run every step of `steps` in order against `capability`, under
/// `run_id`/`tab_id`, persisting audit trail to `repo`.
pub async fn run_plan(
    repo: &Repository,
    capability: &mut dyn BrowserCapability,
    run_id: &str,
    user_id: &str,
    tab_id: &str,
    audit_dir: &Path,
    steps: &[Step],
    browser_config: &BrowserConfig,
) -> Result<RunOutcome> {
    let mut artifacts = Vec::new();
    let mut extracted = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let (kind, selector, value) = step_fields(step);
        let payment = is_payment_related(step);
        let risk = if payment { RiskLevel::Critical } else { RiskLevel::Low };

        let action_id = repo.record_action(run_id, tab_id, index as u32, kind, selector.as_deref(), value.as_deref(), risk, payment)?;

        if payment && browser_config.hard_stop_payments {
            let approval_id = repo.request_browser_approval(&action_id, user_id)?;
            repo.record_audit(&action_id, None, None, serde_json::json!({"reason": "payment_related"}), "needs_approval")?;
            warn!(action_id, approval_id, "payment-related step requires approval");
            return Ok(RunOutcome::NeedsApproval { request_id: approval_id });
        }

        match run_step_with_retries(capability, step, &action_id, audit_dir, index).await? {
            StepOutcome::Completed { before, after } => {
                if let Some(p) = before {
                    push_capped(&mut artifacts, p, MAX_ARTIFACTS);
                }
                if let Some(p) = after {
                    push_capped(&mut artifacts, p, MAX_ARTIFACTS);
                }
                repo.record_audit(&action_id, None, None, serde_json::json!({"step": index, "kind": kind}), "completed")?;
                if let Step::ExtractText { .. } = step {
                    if let Ok(text) = capability.extract_text(selector.as_deref().unwrap_or("")).await {
                        push_capped(&mut extracted, text, MAX_EXTRACTED_LINES);
                    }
                }
            }
            StepOutcome::CheckpointDetected(guidance) => {
                repo.record_audit(&action_id, None, None, serde_json::json!({"checkpoint": guidance}), "failed")?;
                return Ok(RunOutcome::NeedsInput { guidance });
            }
        }
    }

    repo.set_tab_status(tab_id, TabStatus::Released)?;
    info!(run_id, "browser plan completed");
    Ok(RunOutcome::Completed { artifacts, extracted })
}

enum StepOutcome {
    Completed { before: Option<String>, after: Option<String> },
    CheckpointDetected(String),
}

async fn run_step_with_retries(
    capability: &mut dyn BrowserCapability,
    step: &Step,
    action_id: &str,
    audit_dir: &Path,
    step_index: usize,
) -> Result<StepOutcome> {
    let mut last_err: Option<BrowserError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let before = capture_screenshot(capability, audit_dir, action_id, step_index, "before").await.ok();

        let exec_result = execute_step(capability, step).await;
        if let Err(err) = exec_result {
            last_err = Some(err);
            backoff(attempt).await;
            continue;
        }

        let after = capture_screenshot(capability, audit_dir, action_id, step_index, "after").await.ok();

        let state = capability.read_state().await?;
        if let Some(guidance) = detect_checkpoint(&state.url, &state.visible_text) {
            return Ok(StepOutcome::CheckpointDetected(guidance));
        }

        return Ok(StepOutcome::Completed { before, after });
    }

    Err(last_err.unwrap_or_else(|| BrowserError::Other("step failed after retries".into())))
}

async fn execute_step(capability: &mut dyn BrowserCapability, step: &Step) -> Result<()> {
    match step {
        Step::Navigate { url } => capability.navigate(url).await,
        Step::Click { selector } => capability.click(selector).await,
        Step::Type { selector, value } | Step::Fill { selector, value } => capability.fill(selector, value).await,
        Step::WaitFor { selector } => capability.wait_for(selector).await,
        Step::Press { key } => capability.press(key).await,
        Step::Screenshot => capability.screenshot().await.map(|_| ()),
        Step::ExtractText { selector } => capability.extract_text(selector).await.map(|_| ()),
    }
}

async fn capture_screenshot(capability: &mut dyn BrowserCapability, audit_dir: &Path, action_id: &str, step_index: usize, phase: &str) -> Result<String> {
    let bytes = capability.screenshot().await?;
    std::fs::create_dir_all(audit_dir)?;
    let path = audit_dir.join(format!("{action_id}_{step_index}_{phase}.png"));
    std::fs::write(&path, bytes)?;
    Ok(path.to_string_lossy().to_string())
}

fn detect_checkpoint(url: &str, visible_text: &str) -> Option<String> {
    let haystack = format!("{url} {visible_text}").to_lowercase();
    CHECKPOINT_NEEDLES.iter().find(|needle| haystack.contains(**needle)).map(|needle| format!("human checkpoint detected: {needle}"))
}

async fn backoff(attempt: u32) {
    let millis = BASE_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1));
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn push_capped<T>(vec: &mut Vec<T>, item: T, cap: usize) {
    if vec.len() < cap {
        vec.push(item);
    }
}

fn step_fields(step: &Step) -> (&'static str, Option<String>, Option<String>) {
    (step.kind(), step.selector().map(str::to_string), step.value().map(str::to_string))
}

pub fn audit_dir_for(state_home: &Path, run_id: &str, tab_id: &str) -> PathBuf {
    state_home.join("harness").join("browser-audit").join(run_id).join(tab_id)
}
