// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Scores and ranks a user's memory records against a query for
//! inclusion in an agent's context block (spec 4.J "Retrieve").
use std::collections::HashSet;

use tinyagi_repository::{MemoryRecord, Repository};

use crate::error::Result;

const DEFAULT_TOP_N: usize = 12;
const MAX_TOP_N: usize = 20;

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()).filter(|w| !w.is_empty()).collect()
}

/// `2*tokenHits + confidence + updatedAt/1e13` (spec 4.J).
fn score(record: &MemoryRecord, query_tokens: &HashSet<String>) -> f64 {
    let record_tokens = tokenize(&format!("{} {}", record.key, record.value));
    let hits = query_tokens.intersection(&record_tokens).count() as f64;
    2.0 * hits + record.confidence + (record.updated_at as f64) / 1e13
}

/// Rank `user_id`'s memory records against `query`, returning the top
/// `top_n` (capped at 20, default 12 when `top_n` is `None`).
pub fn retrieve(repo: &Repository, user_id: &str, query: &str, top_n: Option<usize>) -> Result<Vec<MemoryRecord>> {
    let query_tokens = tokenize(query);
    let mut records = repo.list_memory_records(user_id)?;
    records.sort_by(|a, b| score(b, &query_tokens).partial_cmp(&score(a, &query_tokens)).unwrap_or(std::cmp::Ordering::Equal));

    let cap = top_n.unwrap_or(DEFAULT_TOP_N).min(MAX_TOP_N);
    records.truncate(cap);
    Ok(records)
}

/// Render ranked records as a Markdown context block for prompt
/// injection.
pub fn format_context_block(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let mut lines = vec!["## Remembered context".to_string(), String::new()];
    for record in records {
        lines.push(format!("- ({}) {}: {}", record.category, record.key, record.value));
    }
    lines.join("\n")
}
