// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Regex-driven extractors that turn free text into candidate memory
//! facts (spec 4.J "Ingest").
use std::sync::OnceLock;

use regex::Regex;
use tinyagi_repository::MemoryCategory;

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    pub confidence: f64,
}

struct Extractor {
    regex: &'static Regex,
    category: MemoryCategory,
    confidence: f64,
}

fn extractors() -> &'static [Extractor] {
    static PREFER: OnceLock<Regex> = OnceLock::new();
    static ALWAYS: OnceLock<Regex> = OnceLock::new();
    static WORKFLOW: OnceLock<Regex> = OnceLock::new();
    static PROJECT: OnceLock<Regex> = OnceLock::new();
    static TASK_STATE: OnceLock<Regex> = OnceLock::new();
    static CORRECTION: OnceLock<Regex> = OnceLock::new();
    static LIST: OnceLock<Vec<Extractor>> = OnceLock::new();

    LIST.get_or_init(|| {
        vec![
            Extractor {
                regex: PREFER.get_or_init(|| Regex::new(r"(?i)\bi prefer\s+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::Preferences,
                confidence: 0.75,
            },
            Extractor {
                regex: ALWAYS.get_or_init(|| Regex::new(r"(?i)\bplease always\s+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::Preferences,
                confidence: 0.8,
            },
            Extractor {
                regex: WORKFLOW.get_or_init(|| Regex::new(r"(?i)\bthis is my workflow[:\s]+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::Workflows,
                confidence: 0.7,
            },
            Extractor {
                regex: PROJECT.get_or_init(|| Regex::new(r"(?i)\b(?:my project is|i'm working on|working on the)\s+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::Projects,
                confidence: 0.65,
            },
            Extractor {
                regex: TASK_STATE.get_or_init(|| Regex::new(r"(?i)\bremember that\s+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::TaskStates,
                confidence: 0.75,
            },
            Extractor {
                regex: CORRECTION.get_or_init(|| Regex::new(r"(?i)\bactually,?\s+([^.!?\n]+)").unwrap()),
                category: MemoryCategory::ConfirmedFacts,
                confidence: 0.85,
            },
        ]
    })
}

/// Slugify `value`'s leading words into a stable-ish key: lowercase,
/// non-alphanumeric runs collapse to `-`, capped at 5 words / 48 chars.
fn slug_key(value: &str) -> String {
    let words: Vec<&str> = value.split_whitespace().take(5).collect();
    let joined = words.join(" ").to_lowercase();
    let mut slug = String::with_capacity(joined.len());
    let mut last_was_dash = false;
    for ch in joined.chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    slug.chars().take(48).collect()
}

/// Run every extractor over `text`, returning one `Extracted` fact per
/// match (duplicates across patterns are not yet deduped — the caller
/// dedups within a single ingest by `(category, key, lower(value))`).
pub fn extract_facts(text: &str) -> Vec<Extracted> {
    let mut out = Vec::new();
    for extractor in extractors() {
        for cap in extractor.regex.captures_iter(text) {
            let Some(value) = cap.get(1) else { continue };
            let value = value.as_str().trim().to_string();
            if value.is_empty() {
                continue;
            }
            let key = slug_key(&value);
            if key.is_empty() {
                continue;
            }
            out.push(Extracted { category: extractor.category, key, value, confidence: extractor.confidence });
        }
    }
    out
}

/// Dedup within a single ingest by `(category, key, lower(value))`,
/// keeping the highest-confidence hit (spec 4.J).
pub fn dedup_highest_confidence(facts: Vec<Extracted>) -> Vec<Extracted> {
    use std::collections::HashMap;
    let mut best: HashMap<(MemoryCategory, String, String), Extracted> = HashMap::new();
    for fact in facts {
        let key = (fact.category, fact.key.clone(), fact.value.to_lowercase());
        match best.get(&key) {
            Some(existing) if existing.confidence >= fact.confidence => {}
            _ => {
                best.insert(key, fact);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_preference_phrase() {
        let facts = extract_facts("I prefer concise bullet-point answers.");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, MemoryCategory::Preferences);
        assert_eq!(facts[0].value, "concise bullet-point answers");
    }

    #[test]
    fn extracts_always_phrase_as_preference() {
        let facts = extract_facts("please always cc my manager on deploy emails");
        assert_eq!(facts[0].category, MemoryCategory::Preferences);
        assert_eq!(facts[0].confidence, 0.8);
    }

    #[test]
    fn extracts_workflow_phrase() {
        let facts = extract_facts("this is my workflow: open a PR then run the smoke tests");
        assert_eq!(facts[0].category, MemoryCategory::Workflows);
    }

    #[test]
    fn extracts_task_state_phrase() {
        let facts = extract_facts("remember that the staging deploy is frozen until Friday");
        assert_eq!(facts[0].category, MemoryCategory::TaskStates);
    }

    #[test]
    fn extracts_correction_phrase() {
        let facts = extract_facts("actually, the API key lives in the other vault");
        assert_eq!(facts[0].category, MemoryCategory::ConfirmedFacts);
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(extract_facts("just a normal sentence with no triggers").is_empty());
    }

    #[test]
    fn slug_key_caps_at_five_words() {
        assert_eq!(slug_key("one two three four five six seven"), "one-two-three-four-five");
    }

    #[test]
    fn dedup_keeps_highest_confidence_within_same_key() {
        let facts = vec![
            Extracted { category: MemoryCategory::Preferences, key: "concise".into(), value: "concise".into(), confidence: 0.5 },
            Extracted { category: MemoryCategory::Preferences, key: "concise".into(), value: "Concise".into(), confidence: 0.9 },
        ];
        let deduped = dedup_highest_confidence(facts);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.9);
    }
}
