// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Top-level run orchestration: classify, route, run the generate/verify/
//! revise loop, apply the publish gate, dispatch to the route-specific
//! executor, finalize (spec 4.L).
use std::path::Path;

use sha2::{Digest, Sha256};
use tinyagi_config::{AgentDef, Config};
use tinyagi_repository::{Repository, RiskLevel, Route, TaskStatus, VerifierOutcome};
use tracing::{error, warn};
use uuid::Uuid;

use crate::classify::{classify_risk, classify_route};
use crate::error::user_facing_error;
use crate::gate;
use crate::loop_engine::{fast_path_verdict, run_loop, Verdict};

pub struct RunRequest<'a> {
    pub message_id: &'a str,
    pub task_id: &'a str,
    pub channel: &'a str,
    pub sender: &'a str,
    pub sender_id: Option<&'a str>,
    pub conversation_id: Option<&'a str>,
    pub branch_key: Option<&'a str>,
    pub from_agent: Option<&'a str>,
    pub user_id: &'a str,
    pub objective: &'a str,
    pub agent_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub status: TaskStatus,
    pub result_text: Option<String>,
}

/// `hash(conversationId|messageId + agentId + fromAgent)` truncated to 16
/// hex chars, plus a timestamp and a uuid slice for uniqueness (spec 4.L).
pub fn build_run_id(conversation_id: Option<&str>, message_id: &str, agent_id: &str, from_agent: Option<&str>, now_millis: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(conversation_id.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(message_id.as_bytes());
    hasher.update(agent_id.as_bytes());
    hasher.update(from_agent.unwrap_or("").as_bytes());
    let digest = hex::encode(hasher.finalize());
    let uuid_slice = &Uuid::new_v4().simple().to_string()[..8];
    format!("run_{}_{now_millis}_{uuid_slice}", &digest[..16])
}

/// Resolve the agent actually assigned to this run: browser routes use the
/// configured Claude-family override when one is set, otherwise the
/// originally routed agent.
fn resolve_assigned_agent<'a>(config: &'a Config, route: Route, requested_agent_id: &'a str) -> &'a str {
    if route == Route::Browser {
        if let Some(override_agent) = config.harness.browser.use_claude_chrome.as_deref() {
            return override_agent;
        }
    }
    requested_agent_id
}

fn lookup_agent<'a>(config: &'a Config, agent_id: &str) -> Option<&'a AgentDef> {
    config.agents.get(agent_id).or_else(|| config.agents.get("default"))
}

/// Verify a candidate: fast-path checks first, then (if none fire) the
/// configured `verifier` agent judges it. A verifier that cannot be
/// invoked at all fails open with `Abstain` rather than blocking the run.
async fn verify_candidate(config: &Config, base_workspace_dir: &Path, candidate: &str) -> Verdict {
    if let Some(verdict) = fast_path_verdict(candidate) {
        return verdict;
    }
    let Some(verifier_agent) = config.agents.get("verifier") else {
        return Verdict::new(VerifierOutcome::Abstain);
    };
    let prompt = format!(
        "Judge whether the following candidate output fully and correctly satisfies its task. \
         Reply with exactly one word: pass, minor_fix, critical_fail, or abstain.\n\n{candidate}"
    );
    match tinyagi_invoker::invoke(base_workspace_dir, "verifier", verifier_agent, &prompt, false, None).await {
        Ok(response) => {
            let outcome = parse_verifier_outcome(&response);
            Verdict { outcome, findings: vec![response], required_actions: vec![], evidence: crate::loop_engine::extract_evidence(candidate) }
        }
        Err(err) => {
            warn!(error = %err, "verifier agent invocation failed; abstaining");
            Verdict::new(VerifierOutcome::Abstain)
        }
    }
}

fn parse_verifier_outcome(response: &str) -> VerifierOutcome {
    let lower = response.to_lowercase();
    if lower.contains("critical_fail") {
        VerifierOutcome::CriticalFail
    } else if lower.contains("minor_fix") {
        VerifierOutcome::MinorFix
    } else if lower.contains("pass") {
        VerifierOutcome::Pass
    } else {
        VerifierOutcome::Abstain
    }
}

/// Run the full harness pipeline for one message (spec 4.L). Never
/// propagates an error to the caller: on any internal failure the run is
/// finalized `failed` with a user-facing message and `Ok` is returned.
pub async fn run(
    repo: &Repository,
    config: &Config,
    base_workspace_dir: &Path,
    skills_dir: &Path,
    memory_raw_dir: &Path,
    state_home: &Path,
    request: RunRequest<'_>,
    now_millis: i64,
) -> anyhow::Result<RunResult> {
    let run_id = build_run_id(request.conversation_id, request.message_id, request.agent_id, request.from_agent, now_millis);

    let (risk, risk_reasons) = classify_risk(request.objective);
    let (route, route_reasons) = classify_route(request.objective);
    let assigned_agent = resolve_assigned_agent(config, route, request.agent_id).to_string();

    repo.create_run(
        &run_id,
        request.task_id,
        request.channel,
        request.sender,
        request.sender_id,
        request.conversation_id,
        request.branch_key,
        request.objective,
        risk,
        &assigned_agent,
    )?;
    repo.append_event(&run_id, "risk_classified", serde_json::json!({"level": risk, "reasons": risk_reasons}))?;
    repo.append_event(&run_id, "task_routed", serde_json::json!({"route": route, "reasons": route_reasons}))?;

    match run_inner(repo, config, base_workspace_dir, skills_dir, memory_raw_dir, state_home, &request, &run_id, risk, route, &assigned_agent).await {
        Ok(result) => Ok(result),
        Err(err) => {
            let message = user_facing_error(&err);
            error!(run_id, error = %err, "run failed");
            repo.append_event(&run_id, "failed", serde_json::json!({"error": message}))?;
            repo.finalize_run(&run_id, TaskStatus::Failed, Some(&message))?;
            Ok(RunResult { run_id, status: TaskStatus::Failed, result_text: Some(message) })
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_inner(
    repo: &Repository,
    config: &Config,
    base_workspace_dir: &Path,
    skills_dir: &Path,
    memory_raw_dir: &Path,
    state_home: &Path,
    request: &RunRequest<'_>,
    run_id: &str,
    risk: RiskLevel,
    route: Route,
    assigned_agent: &str,
) -> anyhow::Result<RunResult> {
    let agent = lookup_agent(config, assigned_agent)
        .ok_or_else(|| anyhow::Error::new(tinyagi_invoker::InvokerError::BinaryMissing { binary: assigned_agent.to_string() }))?;

    let objective = request.objective.to_string();
    let agent_id = assigned_agent.to_string();

    let outcome = run_loop(
        risk,
        || async { tinyagi_invoker::invoke(base_workspace_dir, &agent_id, agent, &objective, false, None).await.map_err(anyhow::Error::from) },
        |candidate, _iter| verify_candidate(config, base_workspace_dir, candidate),
        |candidate, verdict, _iter| {
            let revision_prompt = format!(
                "Revise the following response to address this feedback: {}\n\nOriginal response:\n{candidate}",
                verdict.findings.join("; ")
            );
            async move {
                tinyagi_invoker::invoke(base_workspace_dir, &agent_id, agent, &revision_prompt, true, None).await.map_err(anyhow::Error::from)
            }
        },
        |iteration, kind, payload| async move {
            let _ = repo.append_step(run_id, iteration, kind, payload);
        },
        |kind, payload| async move {
            let _ = repo.append_event(run_id, kind, payload);
        },
    )
    .await?;

    repo.update_run_iteration(run_id, outcome.iterations, Some(outcome.verdict.outcome))?;

    let verified = matches!(outcome.verdict.outcome, VerifierOutcome::Pass | VerifierOutcome::Abstain) && !outcome.exhausted;

    if let Ok(facts) = tinyagi_memory::ingest(repo, request.user_id, &format!("{} {}", request.objective, outcome.output), Some(run_id)) {
        if !facts.is_empty() {
            repo.append_event(run_id, "memory_ingested", serde_json::json!({"count": facts.len()}))?;
        }
    }

    let gate_decision = gate::evaluate(route);
    if !gate_decision.allow {
        repo.append_event(run_id, "awaiting_approval", serde_json::json!({"requestId": gate_decision.request_id}))?;
        repo.finalize_run(run_id, TaskStatus::AwaitingApproval, Some(&outcome.output))?;
        return Ok(RunResult { run_id: run_id.to_string(), status: TaskStatus::AwaitingApproval, result_text: Some(outcome.output) });
    }

    let route_label = match route {
        Route::Agent => "agent",
        Route::Tooling => "tooling",
        Route::Browser => "browser",
        Route::Memory => "memory",
    };

    if verified {
        if let Ok(draft) = tinyagi_skills::auto_draft(repo, skills_dir, request.objective, route_label, verified) {
            if draft.created {
                repo.append_event(run_id, "skill_autodraft", serde_json::json!({"skillId": draft.skill_id}))?;
            }
        }
    }

    if route == Route::Tooling {
        match tinyagi_tooling::run(repo, run_id, request.user_id, &outcome.output, &config.tools).await {
            Ok(exec_outcome) => {
                repo.append_event(run_id, "tooling_execution", serde_json::json!({"outcome": format!("{exec_outcome:?}")}))?;
            }
            Err(err) => {
                warn!(run_id, error = %err, "tooling execution declined or failed");
            }
        }
    } else if route == Route::Browser {
        let tab_id = Uuid::new_v4().simple().to_string();
        let audit_dir = tinyagi_browser::executor::audit_dir_for(state_home, run_id, &tab_id);
        std::fs::create_dir_all(&audit_dir)?;
        let steps = tinyagi_browser::parse_steps(&outcome.output);
        if !steps.is_empty() {
            match tinyagi_browser::acquire(&config.harness.browser).await {
                Ok(mut capability) => {
                    match tinyagi_browser::run_plan(repo, capability.as_mut(), run_id, request.user_id, &tab_id, &audit_dir, &steps, &config.harness.browser).await {
                        Ok(browser_outcome) => {
                            repo.append_event(run_id, "browser_execution", serde_json::json!({"outcome": format!("{browser_outcome:?}")}))?;
                        }
                        Err(err) => warn!(run_id, error = %err, "browser execution failed"),
                    }
                }
                Err(err) => warn!(run_id, error = %err, "browser capability unavailable"),
            }
        }
    }

    let final_status = if verified { TaskStatus::Verified } else { TaskStatus::NeedsInput };
    repo.append_event(run_id, if verified { "verified" } else { "needs_input" }, serde_json::json!({"iterations": outcome.iterations}))?;
    repo.finalize_run(run_id, final_status, Some(&outcome.output))?;

    Ok(RunResult { run_id: run_id.to_string(), status: final_status, result_text: Some(outcome.output) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_run_id_is_deterministic_for_same_inputs() {
        let a = build_run_id(Some("c1"), "m1", "alpha", None, 1000);
        let b = build_run_id(Some("c1"), "m1", "alpha", None, 1000);
        // Same inputs produce the same hash prefix; only the uuid slice differs.
        let prefix_a = a.split('_').nth(1).unwrap();
        let prefix_b = b.split('_').nth(1).unwrap();
        assert_eq!(prefix_a, prefix_b);
    }

    #[test]
    fn build_run_id_differs_for_different_messages() {
        let a = build_run_id(Some("c1"), "m1", "alpha", None, 1000);
        let b = build_run_id(Some("c1"), "m2", "alpha", None, 1000);
        assert_ne!(a.split('_').nth(1), b.split('_').nth(1));
    }

    #[test]
    fn parse_verifier_outcome_recognizes_keywords() {
        assert_eq!(parse_verifier_outcome("Verdict: pass"), VerifierOutcome::Pass);
        assert_eq!(parse_verifier_outcome("this needs a minor_fix"), VerifierOutcome::MinorFix);
        assert_eq!(parse_verifier_outcome("critical_fail: missing evidence"), VerifierOutcome::CriticalFail);
        assert_eq!(parse_verifier_outcome("unclear"), VerifierOutcome::Abstain);
    }
}
