// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Parses an objective + candidate output into a list of typed browser
//! steps (spec 4.I planning).
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Navigate { url: String },
    Click { selector: String },
    Type { value: String, selector: String },
    Fill { selector: String, value: String },
    WaitFor { selector: String },
    Press { key: String },
    Screenshot,
    ExtractText { selector: String },
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Navigate { .. } => "navigate",
            Step::Click { .. } => "click",
            Step::Type { .. } => "type",
            Step::Fill { .. } => "fill",
            Step::WaitFor { .. } => "wait_for",
            Step::Press { .. } => "press",
            Step::Screenshot => "screenshot",
            Step::ExtractText { .. } => "extract_text",
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            Step::Click { selector } | Step::Type { selector, .. } | Step::Fill { selector, .. } | Step::WaitFor { selector } | Step::ExtractText { selector } => Some(selector),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Step::Type { value, .. } | Step::Fill { value, .. } => Some(value),
            Step::Press { key } => Some(key),
            _ => None,
        }
    }
}

/// Normalize a raw selector token: `#id`/`.class`/`[attr]` stay CSS as-is;
/// `text=`/`css=`/`xpath=` prefixes are kept verbatim; multi-word
/// untagged values wrap as `text=<value>`; single identifiers pass
/// through unchanged.
pub fn normalize_selector(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('#') || raw.starts_with('.') || raw.starts_with('[') {
        return raw.to_string();
    }
    if raw.starts_with("text=") || raw.starts_with("css=") || raw.starts_with("xpath=") {
        return raw.to_string();
    }
    if raw.split_whitespace().count() > 1 {
        return format!("text={raw}");
    }
    raw.to_string()
}

fn step_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(navigate|goto|open)\s+(?:to\s+)?(?P<url>https?://\S+)|\b(click)\s+(?P<click_sel>[^\n,.;]+)|\btype\s+"(?P<type_val>[^"]*)"\s+(?:in(?:to)?\s+)?(?P<type_sel>[^\n,.;]+)|\bfill\s+(?P<fill_sel>[^\n,.;]+?)\s+with\s+"(?P<fill_val>[^"]*)"|\bwait\s+for\s+(?P<wait_sel>[^\n,.;]+)|\bpress\s+(?P<key>[A-Za-z0-9_+-]+)|\b(screenshot)\b|\bextract\s+text\s+(?:from\s+)?(?P<extract_sel>[^\n,.;]+)"#,
        )
        .unwrap()
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

/// Parse `text` (objective + candidate output concatenated) into a step
/// list. If nothing parses but a bare URL is present, falls back to
/// `[navigate, screenshot]` (spec 4.I).
pub fn parse_steps(text: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    for cap in step_regex().captures_iter(text) {
        if let Some(url) = cap.name("url") {
            steps.push(Step::Navigate { url: url.as_str().trim_end_matches(['.', ',']).to_string() });
        } else if let Some(sel) = cap.name("click_sel") {
            steps.push(Step::Click { selector: normalize_selector(sel.as_str()) });
        } else if let (Some(val), Some(sel)) = (cap.name("type_val"), cap.name("type_sel")) {
            steps.push(Step::Type { value: val.as_str().to_string(), selector: normalize_selector(sel.as_str()) });
        } else if let (Some(sel), Some(val)) = (cap.name("fill_sel"), cap.name("fill_val")) {
            steps.push(Step::Fill { selector: normalize_selector(sel.as_str()), value: val.as_str().to_string() });
        } else if let Some(sel) = cap.name("wait_sel") {
            steps.push(Step::WaitFor { selector: normalize_selector(sel.as_str()) });
        } else if let Some(key) = cap.name("key") {
            steps.push(Step::Press { key: key.as_str().to_string() });
        } else if let Some(sel) = cap.name("extract_sel") {
            steps.push(Step::ExtractText { selector: normalize_selector(sel.as_str()) });
        } else if cap.get(0).map(|m| m.as_str().to_lowercase()) == Some("screenshot".to_string()) {
            steps.push(Step::Screenshot);
        }
    }

    if steps.is_empty() {
        if let Some(m) = url_regex().find(text) {
            steps.push(Step::Navigate { url: m.as_str().trim_end_matches(['.', ',']).to_string() });
            steps.push(Step::Screenshot);
        }
    }
    steps
}

/// True when `step`'s selector/value/url looks payment-related (spec
/// 4.I checkpoint gating).
pub fn is_payment_related(step: &Step) -> bool {
    const NEEDLES: [&str; 7] = ["pay", "checkout", "purchase", "wallet", "transfer", "card", "cvv"];
    let haystack = match step {
        Step::Navigate { url } => url.clone(),
        _ => format!("{} {}", step.selector().unwrap_or(""), step.value().unwrap_or("")),
    }
    .to_lowercase();
    NEEDLES.iter().any(|n| haystack.contains(n))
}
