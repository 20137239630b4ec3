// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Builds the daily Markdown memory summary from raw JSONL events
//! (spec 4.J "Daily summary").
use std::collections::BTreeMap;
use std::path::Path;

use tinyagi_repository::Repository;

use crate::error::Result;
use crate::raw::read_raw_events_for_date;

const MAX_REQUESTS_PER_CHANNEL: usize = 20;

/// Collect `date`'s raw events, group by channel, render a Markdown
/// summary (last 20 requests per channel), write it to
/// `memory_daily_dir/<date>.md`, and upsert the summary row.
pub fn generate_daily_summary(repo: &Repository, memory_raw_dir: &Path, memory_daily_dir: &Path, date: &str) -> Result<String> {
    let events = read_raw_events_for_date(memory_raw_dir, date)?;

    let mut by_channel: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for event in events {
        by_channel.entry(event.channel).or_default().push(event.request);
    }

    let mut lines = vec![format!("# Daily summary — {date}"), String::new()];
    if by_channel.is_empty() {
        lines.push("No activity recorded.".to_string());
    }
    for (channel, requests) in &by_channel {
        lines.push(format!("## {channel}"));
        lines.push(String::new());
        let recent = &requests[requests.len().saturating_sub(MAX_REQUESTS_PER_CHANNEL)..];
        for request in recent {
            lines.push(format!("- {request}"));
        }
        lines.push(String::new());
    }

    std::fs::create_dir_all(memory_daily_dir)?;
    let path = memory_daily_dir.join(format!("{date}.md"));
    std::fs::write(&path, lines.join("\n"))?;

    repo.upsert_daily_summary(date, &path.to_string_lossy())?;
    Ok(path.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{append_raw_event, RawMemoryEvent};
    use chrono::DateTime;
    use tempfile::TempDir;

    #[test]
    fn generate_daily_summary_groups_by_channel() {
        let raw_dir = TempDir::new().unwrap();
        let daily_dir = TempDir::new().unwrap();
        let repo = Repository::open_in_memory().unwrap();
        let ts = DateTime::parse_from_rfc3339("2026-07-25T08:00:00Z").unwrap().timestamp_millis();
        append_raw_event(raw_dir.path(), &RawMemoryEvent { channel: "whatsapp".into(), sender_id: Some("alice".into()), request: "deploy the app".into(), timestamp_ms: ts }).unwrap();
        append_raw_event(raw_dir.path(), &RawMemoryEvent { channel: "telegram".into(), sender_id: Some("bob".into()), request: "status?".into(), timestamp_ms: ts }).unwrap();

        let path = generate_daily_summary(&repo, raw_dir.path(), daily_dir.path(), "2026-07-25").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## whatsapp"));
        assert!(content.contains("## telegram"));
        assert!(content.contains("deploy the app"));

        let stored = repo.get_daily_summary("2026-07-25").unwrap().unwrap();
        assert_eq!(stored.content_path, path);
    }

    #[test]
    fn generate_daily_summary_handles_empty_day() {
        let raw_dir = TempDir::new().unwrap();
        let daily_dir = TempDir::new().unwrap();
        let repo = Repository::open_in_memory().unwrap();
        let path = generate_daily_summary(&repo, raw_dir.path(), daily_dir.path(), "2026-01-01").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("No activity recorded."));
    }

    #[test]
    fn generate_daily_summary_caps_requests_per_channel() {
        let raw_dir = TempDir::new().unwrap();
        let daily_dir = TempDir::new().unwrap();
        let repo = Repository::open_in_memory().unwrap();
        let ts = DateTime::parse_from_rfc3339("2026-07-25T08:00:00Z").unwrap().timestamp_millis();
        for i in 0..30 {
            append_raw_event(raw_dir.path(), &RawMemoryEvent { channel: "whatsapp".into(), sender_id: None, request: format!("req-{i}"), timestamp_ms: ts }).unwrap();
        }
        let path = generate_daily_summary(&repo, raw_dir.path(), daily_dir.path(), "2026-07-25").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("req-0\n"));
        assert!(content.contains("req-29"));
    }
}
