// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Generate → verify → revise loop with risk-scaled iteration budgets
//! (spec 4.F).
use std::future::Future;

use serde::{Deserialize, Serialize};
use tinyagi_repository::{RiskLevel, VerifierOutcome};

/// Evidence references pulled out of a candidate's text: bare URLs and
/// `[evidence: ...]` tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: VerifierOutcome,
    pub findings: Vec<String>,
    pub required_actions: Vec<String>,
    pub evidence: Vec<String>,
}

impl Verdict {
    pub fn new(outcome: VerifierOutcome) -> Self {
        Self { outcome, findings: Vec::new(), required_actions: Vec::new(), evidence: Vec::new() }
    }
}

pub struct LoopOutcome {
    pub output: String,
    pub verdict: Verdict,
    pub exhausted: bool,
    pub iterations: u32,
}

/// Extract bare `http(s)://` URLs and `[evidence: ...]` tokens from
/// `candidate` (spec 4.F verifier contract).
pub fn extract_evidence(candidate: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in candidate.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != ':' && c != '.' && c != '-' && c != '_');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            out.push(trimmed.to_string());
        }
    }
    let mut rest = candidate;
    while let Some(start) = rest.find("[evidence:") {
        let tail = &rest[start + "[evidence:".len()..];
        if let Some(end) = tail.find(']') {
            out.push(tail[..end].trim().to_string());
            rest = &tail[end + 1..];
        } else {
            break;
        }
    }
    out
}

/// Fast-path checks applied before the real verifier runs: an empty or
/// tiny candidate, or obvious placeholder error text, always fails
/// critically without invoking the LLM verifier.
pub fn fast_path_verdict(candidate: &str) -> Option<Verdict> {
    let trimmed = candidate.trim();
    if trimmed.len() < 8 {
        return Some(Verdict {
            outcome: VerifierOutcome::CriticalFail,
            findings: vec!["candidate output is empty or too short to be useful".to_string()],
            required_actions: vec!["produce a substantive response".to_string()],
            evidence: vec![],
        });
    }
    let lower = trimmed.to_lowercase();
    const PLACEHOLDER_NEEDLES: [&str; 4] = ["todo: implement", "not implemented", "i cannot help with that", "as an ai language model"];
    if PLACEHOLDER_NEEDLES.iter().any(|n| lower.contains(n)) {
        return Some(Verdict {
            outcome: VerifierOutcome::CriticalFail,
            findings: vec!["candidate output looks like placeholder or refusal text".to_string()],
            required_actions: vec!["produce the actual requested output".to_string()],
            evidence: vec![],
        });
    }
    None
}

/// Run the generate/verify/revise contract against `risk`'s iteration
/// budget, recording each step through `record_step` and the terminating
/// `loop_completed`/`loop_exhausted` event exactly once via `record_event`.
///
/// `generate`/`revise` report failure as `anyhow::Error` rather than a
/// crate-specific type, since the caller invokes an opaque agent
/// subprocess whose failure modes (`tinyagi-invoker`) are unrelated to
/// this crate's own error type (spec 4.F, 4.L orchestration layer).
pub async fn run_loop<G, V, R, GFut, VFut, RFut, SFut, EFut>(
    risk: RiskLevel,
    generate: G,
    verify: V,
    revise: R,
    mut record_step: impl FnMut(u32, &'static str, serde_json::Value) -> SFut,
    record_event: impl FnOnce(&'static str, serde_json::Value) -> EFut,
) -> anyhow::Result<LoopOutcome>
where
    G: FnOnce() -> GFut,
    GFut: Future<Output = anyhow::Result<String>>,
    V: Fn(&str, u32) -> VFut,
    VFut: Future<Output = Verdict>,
    R: Fn(&str, &Verdict, u32) -> RFut,
    RFut: Future<Output = anyhow::Result<String>>,
    SFut: Future<Output = ()>,
    EFut: Future<Output = ()>,
{
    let budget = risk.budget();
    let mut iter = 0u32;

    let mut output = generate().await?;
    record_step(iter, "generate", serde_json::json!({ "output": output })).await;

    let mut verdict = verify(&output, iter).await;
    record_step(iter, "verify", serde_json::json!(&verdict)).await;

    loop {
        if matches!(verdict.outcome, VerifierOutcome::Pass | VerifierOutcome::Abstain) {
            record_event("loop_completed", serde_json::json!({ "iterations": iter, "outcome": verdict.outcome })).await;
            return Ok(LoopOutcome { output, verdict, exhausted: false, iterations: iter });
        }

        let revisable = matches!(verdict.outcome, VerifierOutcome::MinorFix | VerifierOutcome::CriticalFail);
        if !revisable || iter >= budget {
            record_event("loop_exhausted", serde_json::json!({ "iterations": iter, "outcome": verdict.outcome })).await;
            return Ok(LoopOutcome { output, verdict, exhausted: true, iterations: iter });
        }

        iter += 1;
        output = revise(&output, &verdict, iter).await?;
        record_step(iter, "revise", serde_json::json!({ "output": output })).await;

        verdict = verify(&output, iter).await;
        record_step(iter, "verify", serde_json::json!(&verdict)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn extract_evidence_finds_urls_and_tokens() {
        let candidate = "See https://example.com/page and [evidence: ticket-123] for details.";
        let evidence = extract_evidence(candidate);
        assert!(evidence.contains(&"https://example.com/page".to_string()));
        assert!(evidence.contains(&"ticket-123".to_string()));
    }

    #[test]
    fn fast_path_flags_tiny_candidate() {
        let v = fast_path_verdict("ok").unwrap();
        assert_eq!(v.outcome, VerifierOutcome::CriticalFail);
    }

    #[test]
    fn fast_path_flags_placeholder_text() {
        let v = fast_path_verdict("Sorry, not implemented yet but here is filler text.").unwrap();
        assert_eq!(v.outcome, VerifierOutcome::CriticalFail);
    }

    #[test]
    fn fast_path_allows_substantive_text() {
        assert!(fast_path_verdict("Here is a complete, substantive answer to your question.").is_none());
    }

    #[tokio::test]
    async fn loop_completes_immediately_on_pass() {
        let steps = RefCell::new(Vec::new());
        let events = RefCell::new(Vec::new());
        let outcome = run_loop(
            RiskLevel::Low,
            || async { Ok("first draft".to_string()) },
            |_c, _i| async { Verdict::new(VerifierOutcome::Pass) },
            |c, _v, _i| async move { Ok(format!("{c} revised")) },
            |i, kind, _p| { steps.borrow_mut().push((i, kind)); async {} },
            |kind, _p| { events.borrow_mut().push(kind); async {} },
        )
        .await
        .unwrap();
        assert!(!outcome.exhausted);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(events.borrow().as_slice(), ["loop_completed"]);
    }

    #[tokio::test]
    async fn loop_revises_until_budget_exhausted() {
        let outcome = run_loop(
            RiskLevel::Medium,
            || async { Ok("draft".to_string()) },
            |_c, _i| async { Verdict::new(VerifierOutcome::MinorFix) },
            |c, _v, i| async move { Ok(format!("{c}-r{i}")) },
            |_i, _k, _p| async {},
            |_k, _p| async {},
        )
        .await
        .unwrap();
        assert!(outcome.exhausted);
        assert_eq!(outcome.iterations, RiskLevel::Medium.budget());
    }

    #[tokio::test]
    async fn loop_exhausts_immediately_on_unrevisable_outcome() {
        let outcome = run_loop(
            RiskLevel::High,
            || async { Ok("draft".to_string()) },
            |_c, _i| async { Verdict::new(VerifierOutcome::CriticalFail) },
            |c, _v, i| async move { Ok(format!("{c}-r{i}")) },
            |_i, _k, _p| async {},
            |_k, _p| async {},
        )
        .await
        .unwrap();
        // critical_fail is revisable, so it should iterate up to budget, not exhaust at iter 0.
        assert_eq!(outcome.iterations, RiskLevel::High.budget());
        assert!(outcome.exhausted);
    }
}
