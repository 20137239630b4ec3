// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turns free text into memory records: extract, dedup, upsert with a
//! stable id (spec 4.J "Ingest").
use sha2::{Digest, Sha256};
use tinyagi_repository::Repository;
use tracing::info;

use crate::extract::{dedup_highest_confidence, extract_facts, Extracted};
use crate::error::Result;

/// `hash(user|category|key)`, truncated to 32 hex chars — stable across
/// ingests so repeated facts upsert the same row (spec 4.J).
pub fn stable_record_id(user_id: &str, category: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(category.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..32].to_string()
}

/// Extract facts from `text`, dedup, and upsert each into the
/// repository. Returns the facts that were written.
pub fn ingest(repo: &Repository, user_id: &str, text: &str, source_run_id: Option<&str>) -> Result<Vec<Extracted>> {
    let facts = dedup_highest_confidence(extract_facts(text));
    for fact in &facts {
        let record_id = stable_record_id(user_id, &fact.category.to_string(), &fact.key);
        repo.upsert_memory_record(&record_id, user_id, fact.category, &fact.key, &fact.value, fact.confidence, source_run_id)?;
    }
    if !facts.is_empty() {
        info!(user_id, count = facts.len(), "ingested memory facts");
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyagi_repository::MemoryCategory;

    #[test]
    fn stable_record_id_is_deterministic() {
        let a = stable_record_id("u1", "preferences", "concise");
        let b = stable_record_id("u1", "preferences", "concise");
        assert_eq!(a, b);
    }

    #[test]
    fn stable_record_id_differs_by_key() {
        assert_ne!(stable_record_id("u1", "preferences", "concise"), stable_record_id("u1", "preferences", "verbose"));
    }

    #[test]
    fn ingest_writes_extracted_facts_to_repository() {
        let repo = Repository::open_in_memory().unwrap();
        let facts = ingest(&repo, "u1", "I prefer concise bullet-point answers.", Some("run_1")).unwrap();
        assert_eq!(facts.len(), 1);
        let stored = repo.get_memory_record("u1", MemoryCategory::Preferences, &facts[0].key).unwrap().unwrap();
        assert_eq!(stored.value, "concise bullet-point answers");
    }

    #[test]
    fn ingest_on_plain_text_writes_nothing() {
        let repo = Repository::open_in_memory().unwrap();
        let facts = ingest(&repo, "u1", "nothing actionable here", None).unwrap();
        assert!(facts.is_empty());
    }
}
