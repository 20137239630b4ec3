// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Name normalization for skill dedup and objective-derived naming.
use regex::Regex;
use std::sync::OnceLock;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap())
}

/// Normalize a skill name for dedup lookups: lowercase, non-alphanumeric
/// runs collapsed to a single `-`, trimmed of leading/trailing `-`.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let collapsed = non_alnum().replace_all(&lower, "-");
    collapsed.trim_matches('-').to_string()
}

const STOPWORDS: &[&str] = &["always", "every", "time", "this", "the", "a", "an", "to", "and", "do", "please"];

/// Derive a normalized skill name from an auto-draft objective by taking the
/// first handful of meaningful words.
pub fn derive_skill_name(objective: &str) -> String {
    let words: Vec<&str> = objective
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .take(6)
        .collect();
    let joined = words.join(" ");
    normalize_name(&joined)
}
