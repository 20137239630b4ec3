// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Candidate command extraction and sanitization (spec 4.H steps 1-2).
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ToolingError, Result};

const SHELL_METACHARACTERS: [char; 3] = [';', '&', '|'];

fn command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+)`|^\s*([A-Za-z0-9_.\-/]+(?:\s+[^\n]*)?)\s*$").unwrap())
}

fn strip_list_prefix(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace())
        .trim_start_matches(['-', '*', '+'])
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches('.')
        .trim_start()
}

/// Scan `candidate_output` line by line for one beginning with an
/// allowlisted tool name; fall back to the first backtick-quoted or
/// bare command-looking line.
pub fn extract_candidate_command(candidate_output: &str, allowlist: &[String]) -> Option<String> {
    for raw_line in candidate_output.lines() {
        let line = strip_list_prefix(raw_line);
        if let Some(first_word) = line.split_whitespace().next() {
            if allowlist.iter().any(|t| t == first_word) {
                return Some(line.to_string());
            }
        }
    }
    for raw_line in candidate_output.lines() {
        let line = strip_list_prefix(raw_line);
        if let Some(cap) = command_regex().captures(line) {
            if let Some(m) = cap.get(1).or_else(|| cap.get(2)) {
                let candidate = m.as_str().trim();
                if !candidate.is_empty() {
                    return Some(candidate.to_string());
                }
            }
        }
    }
    None
}

/// Quote-aware argv tokenizer: splits on whitespace outside of single or
/// double quotes.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Reject empty commands, shell metacharacters, `sudo`, and `rm -rf`;
/// tokenize and verify `argv[0]` is allowlisted (spec 4.H step 2).
pub fn sanitize(command: &str, allowlist: &[String]) -> Result<Vec<String>> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(ToolingError::Rejected("empty command".into()));
    }
    if trimmed.contains(SHELL_METACHARACTERS.as_slice()) {
        return Err(ToolingError::Rejected("shell metacharacters are not allowed".into()));
    }
    if trimmed.contains('`') {
        return Err(ToolingError::Rejected("shell metacharacters are not allowed".into()));
    }
    let lower = trimmed.to_lowercase();
    if lower.split_whitespace().any(|w| w == "sudo") {
        return Err(ToolingError::Rejected("sudo is not allowed".into()));
    }
    if lower.contains("rm -rf") || lower.contains("rm -fr") {
        return Err(ToolingError::Rejected("rm -rf is not allowed".into()));
    }
    let argv = tokenize(trimmed);
    match argv.first() {
        Some(bin) if allowlist.iter().any(|t| t == bin) => Ok(argv),
        Some(bin) => Err(ToolingError::Rejected(format!("{bin} is not an allowlisted tool"))),
        None => Err(ToolingError::Rejected("empty command".into())),
    }
}
