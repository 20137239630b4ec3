// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Append-only raw memory event log under `memory/raw/YYYY/MM/DD/*.jsonl`
//! (spec 4.J daily summary input, §6 queue file layout).
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMemoryEvent {
    pub channel: String,
    pub sender_id: Option<String>,
    pub request: String,
    pub timestamp_ms: i64,
}

fn date_dir(memory_raw_dir: &Path, date: &DateTime<Utc>) -> PathBuf {
    memory_raw_dir.join(date.format("%Y").to_string()).join(date.format("%m").to_string()).join(date.format("%d").to_string())
}

/// Append one JSONL line to today's (UTC) file, creating the
/// `YYYY/MM/DD` directory chain as needed.
pub fn append_raw_event(memory_raw_dir: &Path, event: &RawMemoryEvent) -> Result<()> {
    let date = DateTime::<Utc>::from_timestamp_millis(event.timestamp_ms).unwrap_or_else(Utc::now);
    let dir = date_dir(memory_raw_dir, &date);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")));
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", serde_json::to_string(event).unwrap_or_default())?;
    Ok(())
}

/// Read every event recorded for UTC `date` (`YYYY-MM-DD`), across all
/// its JSONL shards, skipping unparsable lines.
pub fn read_raw_events_for_date(memory_raw_dir: &Path, date: &str) -> Result<Vec<RawMemoryEvent>> {
    let parts: Vec<&str> = date.split('-').collect();
    let [year, month, day] = parts[..] else {
        return Ok(Vec::new());
    };
    let dir = memory_raw_dir.join(year).join(month).join(day);
    let path = dir.join(format!("{date}.jsonl"));
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Ok(Vec::new());
    };

    Ok(contents.lines().filter_map(|line| serde_json::from_str(line).ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_then_read_round_trips_same_date() {
        let dir = TempDir::new().unwrap();
        let ts = DateTime::parse_from_rfc3339("2026-07-25T10:00:00Z").unwrap().timestamp_millis();
        append_raw_event(dir.path(), &RawMemoryEvent { channel: "whatsapp".into(), sender_id: Some("alice".into()), request: "hi".into(), timestamp_ms: ts }).unwrap();

        let events = read_raw_events_for_date(dir.path(), "2026-07-25").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request, "hi");
    }

    #[test]
    fn read_missing_date_returns_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_raw_events_for_date(dir.path(), "2026-01-01").unwrap().is_empty());
    }

    #[test]
    fn events_for_distinct_dates_land_in_distinct_shards() {
        let dir = TempDir::new().unwrap();
        let ts_a = DateTime::parse_from_rfc3339("2026-07-25T10:00:00Z").unwrap().timestamp_millis();
        let ts_b = DateTime::parse_from_rfc3339("2026-07-26T10:00:00Z").unwrap().timestamp_millis();
        append_raw_event(dir.path(), &RawMemoryEvent { channel: "whatsapp".into(), sender_id: None, request: "a".into(), timestamp_ms: ts_a }).unwrap();
        append_raw_event(dir.path(), &RawMemoryEvent { channel: "whatsapp".into(), sender_id: None, request: "b".into(), timestamp_ms: ts_b }).unwrap();

        assert_eq!(read_raw_events_for_date(dir.path(), "2026-07-25").unwrap().len(), 1);
        assert_eq!(read_raw_events_for_date(dir.path(), "2026-07-26").unwrap().len(), 1);
    }
}
