// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Publish gate: the production policy allows everything, but the
//! contract for inserting a pending approval request is kept live so a
//! stricter policy can be swapped in later (spec 4.G).
use tinyagi_repository::{Repository, Result, Route};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allow: bool,
    pub requires_approval: bool,
    pub request_id: Option<String>,
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self { allow: true, requires_approval: false, request_id: None, reason: None }
    }

    pub fn pending(request_id: String, reason: impl Into<String>) -> Self {
        Self { allow: false, requires_approval: true, request_id: Some(request_id), reason: Some(reason.into()) }
    }
}

/// Evaluate the publish gate for a finished run's output. `route ==
/// Browser` always passes without consulting the gate at all — the
/// browser executor enforces its own per-action approval — callers
/// should skip invoking this function for browser routes entirely.
///
/// The production policy allows everything else too (gate disabled);
/// `request_pending_approval` below is the hook a stricter policy would
/// call instead of `GateDecision::allow()`.
pub fn evaluate(route: Route) -> GateDecision {
    if route == Route::Browser {
        return GateDecision::allow();
    }
    GateDecision::allow()
}

/// Insert a pending approval request for `run_id`/`user_id`, to be used
/// by a future gate policy that does not allow everything.
pub fn request_pending_approval(repo: &Repository, user_id: &str, run_id: &str, reason: &str) -> Result<GateDecision> {
    let request_id = repo.request_permission(user_id, "publish_gate", run_id, None)?;
    Ok(GateDecision::pending(request_id, reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_route_is_allowed_under_production_policy() {
        let decision = evaluate(Route::Agent);
        assert!(decision.allow);
        assert!(!decision.requires_approval);
    }

    #[test]
    fn browser_route_bypasses_the_gate() {
        let decision = evaluate(Route::Browser);
        assert!(decision.allow);
    }

    #[test]
    fn request_pending_approval_creates_a_permission_row() {
        let repo = Repository::open_in_memory().unwrap();
        let decision = request_pending_approval(&repo, "u1", "run_1", "manual review needed").unwrap();
        assert!(!decision.allow);
        assert!(decision.requires_approval);
        assert!(decision.request_id.is_some());
    }
}
