// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Auto-draft trigger detection on a verified run's objective (spec 4.K).
const GENERIC_TRIGGERS: &[&str] = &["always", "every time", "automate", "repeat this", "workflow", "template"];
const TOOLING_TRIGGERS: &[&str] = &["install", "configure"];
const BROWSER_TRIGGERS: &[&str] = &["login", "submit", "portal", "dashboard"];

/// Return `true` when `objective` contains a generic trigger phrase, or a
/// `route`-specific keyword, and the run was verified.
pub fn should_auto_draft(objective: &str, route: &str, verified: bool) -> bool {
    if !verified {
        return false;
    }
    let lower = objective.to_lowercase();
    if GENERIC_TRIGGERS.iter().any(|t| lower.contains(t)) {
        return true;
    }
    match route {
        "tooling" => TOOLING_TRIGGERS.iter().any(|t| lower.contains(t)),
        "browser" => BROWSER_TRIGGERS.iter().any(|t| lower.contains(t)),
        _ => false,
    }
}
