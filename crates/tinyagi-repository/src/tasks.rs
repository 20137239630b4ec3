// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use uuid::Uuid;

use crate::model::{RiskLevel, TaskEvent, TaskRun, TaskStatus, TaskStep, VerifierOutcome};
use crate::{now_millis, Repository, Result};

impl Repository {
    /// Create a new run in `in_progress` with `loop_iteration = 0`.
    pub fn create_run(
        &self,
        run_id: &str,
        task_id: &str,
        channel: &str,
        sender: &str,
        sender_id: Option<&str>,
        conversation_id: Option<&str>,
        branch_key: Option<&str>,
        objective: &str,
        risk_level: RiskLevel,
        assigned_agent: &str,
    ) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_runs
                (run_id, task_id, channel, sender, sender_id, conversation_id, branch_key,
                 objective, risk_level, status, assigned_agent, loop_iteration, max_iterations,
                 verifier_outcome, result_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, NULL, NULL, ?13, ?13)",
            rusqlite::params![
                run_id,
                task_id,
                channel,
                sender,
                sender_id,
                conversation_id,
                branch_key,
                objective,
                risk_level,
                TaskStatus::InProgress,
                assigned_agent,
                risk_level.budget(),
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<TaskRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, task_id, channel, sender, sender_id, conversation_id, branch_key,
                    objective, risk_level, status, assigned_agent, loop_iteration, max_iterations,
                    verifier_outcome, result_text, created_at, updated_at
             FROM task_runs WHERE run_id = ?1",
        )?;
        let row = stmt
            .query_row(rusqlite::params![run_id], row_to_task_run)
            .ok();
        Ok(row)
    }

    pub fn list_runs(&self) -> Result<Vec<TaskRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, task_id, channel, sender, sender_id, conversation_id, branch_key,
                    objective, risk_level, status, assigned_agent, loop_iteration, max_iterations,
                    verifier_outcome, result_text, created_at, updated_at
             FROM task_runs ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_task_run)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Advance a run's loop iteration and persist its verifier outcome.
    pub fn update_run_iteration(
        &self,
        run_id: &str,
        loop_iteration: u32,
        verifier_outcome: Option<VerifierOutcome>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_runs SET loop_iteration = ?2, verifier_outcome = ?3, updated_at = ?4 WHERE run_id = ?1",
            rusqlite::params![run_id, loop_iteration, verifier_outcome, now_millis()],
        )?;
        Ok(())
    }

    /// Finalize a run to a terminal-ish status with its result text.
    pub fn finalize_run(&self, run_id: &str, status: TaskStatus, result_text: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_runs SET status = ?2, result_text = ?3, updated_at = ?4 WHERE run_id = ?1",
            rusqlite::params![run_id, status, result_text, now_millis()],
        )?;
        Ok(())
    }

    pub fn append_event(&self, run_id: &str, kind: &str, payload: serde_json::Value) -> Result<String> {
        let event_id = format!("evt_{}", Uuid::new_v4());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_events (event_id, run_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![event_id, run_id, kind, payload.to_string(), now_millis()],
        )?;
        Ok(event_id)
    }

    pub fn list_events(&self, run_id: &str) -> Result<Vec<TaskEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, run_id, kind, payload, created_at FROM task_events WHERE run_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(rusqlite::params![run_id], |row| {
            let payload_text: String = row.get(3)?;
            Ok(TaskEvent {
                event_id: row.get(0)?,
                run_id: row.get(1)?,
                kind: row.get(2)?,
                payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn append_step(&self, run_id: &str, iteration: u32, kind: &str, payload: serde_json::Value) -> Result<String> {
        let step_id = format!("step_{}", Uuid::new_v4());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_steps (step_id, run_id, iteration, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![step_id, run_id, iteration, kind, payload.to_string(), now_millis()],
        )?;
        Ok(step_id)
    }

    pub fn list_steps(&self, run_id: &str) -> Result<Vec<TaskStep>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT step_id, run_id, iteration, kind, payload, created_at FROM task_steps WHERE run_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(rusqlite::params![run_id], |row| {
            let payload_text: String = row.get(4)?;
            Ok(TaskStep {
                step_id: row.get(0)?,
                run_id: row.get(1)?,
                iteration: row.get(2)?,
                kind: row.get(3)?,
                payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
                created_at: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// For `(channel, sender_id)`, mark every `needs_input` run older than
    /// `cutoff_millis` as `rejected` and emit a `superseded_by_new_message`
    /// event for each, returning the affected run ids.
    pub fn supersede_needs_input(&self, channel: &str, sender_id: &str, cutoff_millis: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id FROM task_runs
             WHERE channel = ?1 AND sender_id = ?2 AND status = ?3 AND updated_at < ?4",
        )?;
        let ids: Vec<String> = stmt
            .query_map(
                rusqlite::params![channel, sender_id, TaskStatus::NeedsInput, cutoff_millis],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<_>>()?;

        let now = now_millis();
        for id in &ids {
            conn.execute(
                "UPDATE task_runs SET status = ?2, updated_at = ?3 WHERE run_id = ?1",
                rusqlite::params![id, TaskStatus::Rejected, now],
            )?;
            conn.execute(
                "INSERT INTO task_events (event_id, run_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    format!("evt_{}", Uuid::new_v4()),
                    id,
                    "superseded_by_new_message",
                    serde_json::json!({"channel": channel, "senderId": sender_id}).to_string(),
                    now,
                ],
            )?;
        }
        Ok(ids)
    }

    /// Distinct `(channel, senderId)` pairs with a run created at or after
    /// `since_millis`, for digest-target enumeration (spec 4.M).
    pub fn list_distinct_senders_since(&self, since_millis: i64) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT channel, sender_id FROM task_runs WHERE created_at >= ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![since_millis], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Newest blocked run per `(channel, sender_id)` older than `min_age_millis`
    /// with no newer run for the same sender (spec 4.A).
    pub fn list_blocked_runs_for_outreach(&self, min_age_millis: i64) -> Result<Vec<TaskRun>> {
        let cutoff = now_millis() - min_age_millis;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, task_id, channel, sender, sender_id, conversation_id, branch_key,
                    objective, risk_level, status, assigned_agent, loop_iteration, max_iterations,
                    verifier_outcome, result_text, created_at, updated_at
             FROM task_runs t
             WHERE status IN (?1, ?2)
               AND updated_at < ?3
               AND updated_at = (
                   SELECT MAX(updated_at) FROM task_runs t2
                   WHERE t2.channel = t.channel AND t2.sender_id IS t.sender_id
               )",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![TaskStatus::NeedsInput, TaskStatus::AwaitingApproval, cutoff],
            row_to_task_run,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_task_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRun> {
    let risk_text: String = row.get(8)?;
    let status_text: String = row.get(9)?;
    let verifier_text: Option<String> = row.get(13)?;
    Ok(TaskRun {
        run_id: row.get(0)?,
        task_id: row.get(1)?,
        channel: row.get(2)?,
        sender: row.get(3)?,
        sender_id: row.get(4)?,
        conversation_id: row.get(5)?,
        branch_key: row.get(6)?,
        objective: row.get(7)?,
        risk_level: RiskLevel::from_str(&risk_text).unwrap_or(RiskLevel::Low),
        status: TaskStatus::from_str(&status_text).unwrap_or(TaskStatus::Failed),
        assigned_agent: row.get(10)?,
        loop_iteration: row.get(11)?,
        max_iterations: row.get(12)?,
        verifier_outcome: verifier_text.and_then(|s| VerifierOutcome::from_str(&s).ok()),
        result_text: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}
