// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Reconstructs a step plan from a prior run's selector trace and
//! executes it under a fresh run id (spec 4.I "Replay").
use std::path::Path;

use tinyagi_repository::{BrowserAudit, Repository};
use tracing::info;

use crate::capability::BrowserCapability;
use crate::error::{BrowserError, Result};
use crate::executor::{audit_dir_for, run_plan, RunOutcome};
use crate::plan::Step;

/// Deserialize the `(kind, selector, value)` triple an audit's
/// `selector_trace` carries for successful/checkpoint entries, dropping
/// anything malformed.
fn step_from_audit(audit: &BrowserAudit) -> Option<Step> {
    if audit.outcome != "completed" && audit.outcome != "failed" {
        return None;
    }
    let kind = audit.selector_trace.get("kind")?.as_str()?;
    let selector = audit.selector_trace.get("selector").and_then(|v| v.as_str()).map(str::to_string);
    let value = audit.selector_trace.get("value").and_then(|v| v.as_str()).map(str::to_string);

    match kind {
        "navigate" => Some(Step::Navigate { url: value? }),
        "click" => Some(Step::Click { selector: selector? }),
        "fill" | "type" => Some(Step::Fill { selector: selector?, value: value? }),
        "wait_for" => Some(Step::WaitFor { selector: selector? }),
        "press" => Some(Step::Press { key: value? }),
        "screenshot" => Some(Step::Screenshot),
        "extract_text" => Some(Step::ExtractText { selector: selector? }),
        _ => None,
    }
}

/// Build a replay plan from `run_id`'s most recent tab trace: dedup by
/// action id, drop unparsable entries, prepend a navigate to
/// `base_url`.
pub fn build_replay_plan(repo: &Repository, run_id: &str, base_url: &str) -> Result<Vec<Step>> {
    let trace = repo.selector_trace_for_run(run_id)?;

    let mut seen = std::collections::HashSet::new();
    let mut steps = vec![Step::Navigate { url: base_url.to_string() }];

    for audit in &trace {
        if !seen.insert(audit.action_id.clone()) {
            continue;
        }
        if let Some(step) = step_from_audit(audit) {
            steps.push(step);
        }
    }
    Ok(steps)
}

/// Execute `replay_run_id` replaying `source_run_id`'s trace.
pub async fn replay_browser_run(
    repo: &Repository,
    capability: &mut dyn BrowserCapability,
    source_run_id: &str,
    replay_run_id: &str,
    user_id: &str,
    base_url: &str,
    state_home: &Path,
    browser_config: &tinyagi_config::BrowserConfig,
) -> Result<RunOutcome> {
    let steps = build_replay_plan(repo, source_run_id, base_url)?;
    if steps.len() <= 1 {
        return Err(BrowserError::Other(format!("no replayable steps found for run {source_run_id}")));
    }

    let source_tab = repo.latest_tab_for_run(source_run_id)?.ok_or_else(|| BrowserError::Other(format!("no tab recorded for run {source_run_id}")))?;
    let session_id = source_tab.session_id;
    let tab_id = repo.open_tab(&session_id, replay_run_id)?;
    let audit_dir = audit_dir_for(state_home, replay_run_id, &tab_id);

    info!(source_run_id, replay_run_id, step_count = steps.len(), "replaying browser run");
    run_plan(repo, capability, replay_run_id, user_id, &tab_id, &audit_dir, &steps, browser_config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyagi_repository::RiskLevel;

    struct NeverCalled;

    #[async_trait::async_trait]
    impl BrowserCapability for NeverCalled {
        async fn navigate(&mut self, _url: &str) -> Result<()> {
            unreachable!("replay must bail out before touching the capability")
        }
        async fn click(&mut self, _selector: &str) -> Result<()> {
            unreachable!()
        }
        async fn fill(&mut self, _selector: &str, _value: &str) -> Result<()> {
            unreachable!()
        }
        async fn wait_for(&mut self, _selector: &str) -> Result<()> {
            unreachable!()
        }
        async fn press(&mut self, _key: &str) -> Result<()> {
            unreachable!()
        }
        async fn extract_text(&mut self, _selector: &str) -> Result<String> {
            unreachable!()
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>> {
            unreachable!()
        }
        async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
            unreachable!()
        }
        async fn read_state(&mut self) -> Result<crate::capability::PageState> {
            unreachable!()
        }
        async fn close(&mut self) -> Result<()> {
            unreachable!()
        }
    }

    /// S6: replaying an unknown run produces the "no replayable steps
    /// found" error without ever dispatching to the capability.
    #[tokio::test]
    async fn replay_unknown_run_reports_no_replayable_steps() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let mut capability = NeverCalled;
        let err = replay_browser_run(
            &repo,
            &mut capability,
            "missing_run",
            "replay_1",
            "u1",
            "https://example.com",
            tmp.path(),
            &tinyagi_config::BrowserConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no replayable steps found"));
    }

    #[test]
    fn build_replay_plan_prepends_navigate_and_dedups_by_action() {
        let repo = Repository::open_in_memory().unwrap();
        repo.create_run("run_1", "task_1", "whatsapp", "alice", None, None, None, "buy a thing", RiskLevel::Low, "alpha").unwrap();
        let session = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        let tab = repo.open_tab(&session, "run_1").unwrap();
        let a1 = repo.record_action("run_1", &tab, 0, "navigate", None, Some("https://shop.example.com"), RiskLevel::Low, false).unwrap();
        repo.record_audit(&a1, None, None, serde_json::json!({"kind": "navigate", "value": "https://shop.example.com"}), "completed").unwrap();
        repo.record_audit(&a1, None, None, serde_json::json!({"kind": "navigate", "value": "https://shop.example.com"}), "completed").unwrap();

        let steps = build_replay_plan(&repo, "run_1", "https://shop.example.com").unwrap();
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Navigate { .. }));
    }

    #[test]
    fn step_from_audit_drops_malformed_entry() {
        let audit = BrowserAudit {
            audit_id: "a".into(),
            action_id: "b".into(),
            before_screenshot: None,
            after_screenshot: None,
            selector_trace: serde_json::json!({"kind": "click"}),
            outcome: "completed".into(),
            created_at: 0,
        };
        assert!(step_from_audit(&audit).is_none());
    }
}
