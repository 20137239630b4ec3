// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Risk classification and route selection for an incoming objective.
use std::sync::OnceLock;

use regex::Regex;
use tinyagi_repository::{RiskLevel, Route};

struct RiskPattern {
    regex: Regex,
    level: RiskLevel,
    reason: &'static str,
}

/// Ordered highest-signal-first; the maximum matched level wins, not the
/// first match (spec 4.E).
fn risk_patterns() -> &'static Vec<RiskPattern> {
    static PATTERNS: OnceLock<Vec<RiskPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            RiskPattern { regex: Regex::new(r"(?i)\b(pay|checkout|purchase|wallet|transfer|card number|cvv)\b").unwrap(), level: RiskLevel::Critical, reason: "payment-related keyword" },
            RiskPattern { regex: Regex::new(r"(?i)\b(rm -rf|drop table|drop database|force[- ]?push|delete (all|everything)|wipe)\b").unwrap(), level: RiskLevel::Critical, reason: "destructive operation keyword" },
            RiskPattern { regex: Regex::new(r"(?i)\b(production|prod environment|live database|deploy)\b").unwrap(), level: RiskLevel::High, reason: "production-impacting keyword" },
            RiskPattern { regex: Regex::new(r"(?i)\b(delete|remove|uninstall|revoke|reset)\b").unwrap(), level: RiskLevel::Medium, reason: "mutating keyword" },
            RiskPattern { regex: Regex::new(r"(?i)\b(install|configure|modify|update|change)\b").unwrap(), level: RiskLevel::Medium, reason: "configuration keyword" },
        ]
    })
}

/// Classify `text`'s risk level: the highest level among all matching
/// patterns, or `low` if nothing matches.
pub fn classify_risk(text: &str) -> (RiskLevel, Vec<String>) {
    let mut level = RiskLevel::Low;
    let mut reasons = Vec::new();
    for pattern in risk_patterns() {
        if pattern.regex.is_match(text) {
            reasons.push(pattern.reason.to_string());
            if risk_rank(pattern.level) > risk_rank(level) {
                level = pattern.level;
            }
        }
    }
    if reasons.is_empty() {
        reasons.push("no risk keywords matched; defaulting to low".to_string());
    }
    (level, reasons)
}

fn risk_rank(level: RiskLevel) -> u8 {
    match level {
        RiskLevel::Low => 0,
        RiskLevel::Medium => 1,
        RiskLevel::High => 2,
        RiskLevel::Critical => 3,
    }
}

const BROWSER_KEYWORDS: [&str; 4] = ["chrome", "browser", "navigate", "login"];
const TOOLING_KEYWORDS: [&str; 5] = ["install", "tool", "package manager", "package-manager", "dependency"];
const MEMORY_KEYWORDS: [&str; 3] = ["remember", "preference", "prefer"];

fn contains_any(lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| lower.contains(n))
}

/// Route precedence: browser > tooling > memory > agent (spec 4.E).
pub fn classify_route(text: &str) -> (Route, Vec<String>) {
    let lower = text.to_lowercase();
    if contains_any(&lower, &BROWSER_KEYWORDS) {
        return (Route::Browser, vec!["matched a browser-navigation keyword".to_string()]);
    }
    if contains_any(&lower, &TOOLING_KEYWORDS) {
        return (Route::Tooling, vec!["matched a tool/package-manager keyword".to_string()]);
    }
    if contains_any(&lower, &MEMORY_KEYWORDS) {
        return (Route::Memory, vec!["matched a remember/preference keyword".to_string()]);
    }
    (Route::Agent, vec!["no route keyword matched; defaulting to agent".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_classifies_low_risk() {
        let (level, _) = classify_risk("say hello");
        assert_eq!(level, RiskLevel::Low);
    }

    #[test]
    fn payment_keyword_classifies_critical() {
        let (level, reasons) = classify_risk("please checkout my cart");
        assert_eq!(level, RiskLevel::Critical);
        assert!(!reasons.is_empty());
    }

    #[test]
    fn highest_matched_level_wins_over_lower_matches() {
        let (level, _) = classify_risk("install this tool then drop database prod");
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn destructive_rm_rf_is_critical() {
        let (level, _) = classify_risk("run rm -rf on the build dir");
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn route_prefers_browser_over_tooling() {
        let (route, _) = classify_route("navigate chrome and install a tool");
        assert_eq!(route, Route::Browser);
    }

    #[test]
    fn route_prefers_tooling_over_memory() {
        let (route, _) = classify_route("install this and remember my preference");
        assert_eq!(route, Route::Tooling);
    }

    #[test]
    fn route_falls_back_to_memory() {
        let (route, _) = classify_route("please remember I prefer dark mode");
        assert_eq!(route, Route::Memory);
    }

    #[test]
    fn route_defaults_to_agent() {
        let (route, _) = classify_route("what's the weather like today");
        assert_eq!(route, Route::Agent);
    }
}
