// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::model::DailySummary;
use crate::{now_millis, Repository, Result};

impl Repository {
    /// Upsert the single summary row for `date` (spec 4.J "upsert one
    /// summary row" per UTC date).
    pub fn upsert_daily_summary(&self, date: &str, content_path: &str) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO daily_summaries (summary_date, content_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(summary_date) DO UPDATE SET content_path = excluded.content_path, updated_at = excluded.updated_at",
            rusqlite::params![date, content_path, now],
        )?;
        Ok(())
    }

    pub fn get_daily_summary(&self, date: &str) -> Result<Option<DailySummary>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT summary_date, content_path, created_at, updated_at FROM daily_summaries WHERE summary_date = ?1",
                rusqlite::params![date],
                |row| {
                    Ok(DailySummary {
                        summary_date: row.get(0)?,
                        content_path: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }
}
