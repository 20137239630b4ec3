// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use crate::model::{MemoryCategory, MemoryRecord};
use crate::{now_millis, Repository, Result};

impl Repository {
    /// Upsert a memory record keyed by `(user_id, category, key)`. A newer
    /// ingest only overwrites the stored value when its confidence is at
    /// least as high as the existing one (spec §3 invariant: "newer ingest
    /// with higher confidence wins").
    pub fn upsert_memory_record(
        &self,
        record_id: &str,
        user_id: &str,
        category: MemoryCategory,
        key: &str,
        value: &str,
        confidence: f64,
        source_run_id: Option<&str>,
    ) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memory_records
                (record_id, user_id, category, key, value, confidence, source_run_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(user_id, category, key) DO UPDATE SET
                value = excluded.value,
                confidence = excluded.confidence,
                source_run_id = excluded.source_run_id,
                updated_at = excluded.updated_at
             WHERE excluded.confidence >= memory_records.confidence",
            rusqlite::params![record_id, user_id, category, key, value, confidence, source_run_id, now],
        )?;
        Ok(())
    }

    pub fn get_memory_record(&self, user_id: &str, category: MemoryCategory, key: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT record_id, user_id, category, key, value, confidence, source_run_id, created_at, updated_at
                 FROM memory_records WHERE user_id = ?1 AND category = ?2 AND key = ?3",
                rusqlite::params![user_id, category, key],
                row_to_memory_record,
            )
            .ok();
        Ok(row)
    }

    pub fn list_memory_records(&self, user_id: &str) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT record_id, user_id, category, key, value, confidence, source_run_id, created_at, updated_at
             FROM memory_records WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id], row_to_memory_record)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn delete_memory_topic(&self, user_id: &str, key_substring: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM memory_records WHERE user_id = ?1 AND key LIKE ?2",
            rusqlite::params![user_id, format!("%{key_substring}%")],
        )?;
        Ok(n)
    }
}

fn row_to_memory_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let category_text: String = row.get(2)?;
    Ok(MemoryRecord {
        record_id: row.get(0)?,
        user_id: row.get(1)?,
        category: MemoryCategory::from_str(&category_text).unwrap_or(MemoryCategory::ConfirmedFacts),
        key: row.get(3)?,
        value: row.get(4)?,
        confidence: row.get(5)?,
        source_run_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_get_round_trips() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "updates", "concise bullets", 0.8, None)
            .unwrap();
        let rec = repo.get_memory_record("u1", MemoryCategory::Preferences, "updates").unwrap().unwrap();
        assert_eq!(rec.value, "concise bullets");
        assert_eq!(rec.confidence, 0.8);
    }

    #[test]
    fn higher_confidence_ingest_overwrites_value() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "k", "v1", 0.5, None).unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "k", "v2", 0.9, None).unwrap();
        let rec = repo.get_memory_record("u1", MemoryCategory::Preferences, "k").unwrap().unwrap();
        assert_eq!(rec.value, "v2");
        assert_eq!(rec.confidence, 0.9);
    }

    #[test]
    fn lower_confidence_ingest_does_not_overwrite() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "k", "v1", 0.9, None).unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "k", "v2", 0.2, None).unwrap();
        let rec = repo.get_memory_record("u1", MemoryCategory::Preferences, "k").unwrap().unwrap();
        assert_eq!(rec.value, "v1");
    }

    #[test]
    fn delete_memory_topic_removes_matching_keys_only() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_memory_record("rec_1", "u1", MemoryCategory::Preferences, "updates-style", "v", 0.5, None).unwrap();
        repo.upsert_memory_record("rec_2", "u1", MemoryCategory::Preferences, "colors", "v", 0.5, None).unwrap();
        let n = repo.delete_memory_topic("u1", "updates").unwrap();
        assert_eq!(n, 1);
        assert_eq!(repo.list_memory_records("u1").unwrap().len(), 1);
    }
}
