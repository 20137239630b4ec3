// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use uuid::Uuid;

use crate::{now_millis, Repository, Result};

impl Repository {
    /// Increment a named counter and append an auditable metric-event row.
    pub fn increment_metric(&self, name: &str, delta: f64, metadata: serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metrics (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
            rusqlite::params![name, delta],
        )?;
        conn.execute(
            "INSERT INTO metric_events (event_id, name, delta, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![format!("mevt_{}", Uuid::new_v4()), name, delta, metadata.to_string(), now_millis()],
        )?;
        Ok(())
    }

    pub fn get_metric(&self, name: &str) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row("SELECT value FROM metrics WHERE name = ?1", rusqlite::params![name], |row| row.get(0))
            .unwrap_or(0.0))
    }

    pub fn all_metrics(&self) -> Result<Vec<(String, f64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, value FROM metrics ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// `response_loss_rate = dropped / (delivered + dropped)` (spec §6).
    pub fn response_loss_rate(&self) -> Result<f64> {
        let delivered = self.get_metric("messages_delivered_count")?;
        let dropped = self.get_metric("messages_dropped_count")?;
        let total = delivered + dropped;
        Ok(if total == 0.0 { 0.0 } else { dropped / total })
    }
}
