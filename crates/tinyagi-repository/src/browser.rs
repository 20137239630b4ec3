// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use uuid::Uuid;

use crate::model::{
    ApprovalStatus, BrowserAction, BrowserApproval, BrowserAudit, BrowserSession, BrowserTab, RiskLevel, TabStatus,
};
use crate::{now_millis, Repository, Result};

impl Repository {
    /// Idempotent: attaches to an existing `(host, port)` session rather
    /// than creating a duplicate (spec §5: "the launcher is idempotent").
    pub fn ensure_browser_session(&self, host: &str, port: u16, profile_path: Option<&str>) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        if let Some(id) = conn
            .query_row(
                "SELECT session_id FROM browser_sessions WHERE host = ?1 AND port = ?2",
                rusqlite::params![host, port],
                |row| row.get::<_, String>(0),
            )
            .ok()
        {
            return Ok(id);
        }
        let id = format!("bsess_{}", Uuid::new_v4());
        conn.execute(
            "INSERT INTO browser_sessions (session_id, host, port, profile_path, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, host, port, profile_path, now_millis()],
        )?;
        Ok(id)
    }

    pub fn list_browser_sessions(&self) -> Result<Vec<BrowserSession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, host, port, profile_path, created_at FROM browser_sessions ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BrowserSession {
                session_id: row.get(0)?,
                host: row.get(1)?,
                port: row.get(2)?,
                profile_path: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Every tab, optionally filtered to one `run_id` (`browser tabs [runId]`).
    pub fn list_tabs(&self, run_id: Option<&str>) -> Result<Vec<BrowserTab>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tab_id, session_id, run_id, status, created_at, updated_at
             FROM browser_tabs WHERE ?1 IS NULL OR run_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_tab)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn open_tab(&self, session_id: &str, run_id: &str) -> Result<String> {
        let id = format!("tab_{}", Uuid::new_v4());
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO browser_tabs (tab_id, session_id, run_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, session_id, run_id, TabStatus::Active, now],
        )?;
        Ok(id)
    }

    pub fn set_tab_status(&self, tab_id: &str, status: TabStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE browser_tabs SET status = ?2, updated_at = ?3 WHERE tab_id = ?1",
            rusqlite::params![tab_id, status, now_millis()],
        )?;
        Ok(())
    }

    pub fn latest_tab_for_run(&self, run_id: &str) -> Result<Option<BrowserTab>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT tab_id, session_id, run_id, status, created_at, updated_at
                 FROM browser_tabs WHERE run_id = ?1 ORDER BY created_at DESC LIMIT 1",
                rusqlite::params![run_id],
                row_to_tab,
            )
            .ok();
        Ok(row)
    }

    pub fn record_action(
        &self,
        run_id: &str,
        tab_id: &str,
        step_index: u32,
        kind: &str,
        selector: Option<&str>,
        value: Option<&str>,
        risk: RiskLevel,
        requires_approval: bool,
    ) -> Result<String> {
        let id = format!("baction_{}", Uuid::new_v4());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO browser_actions
                (action_id, run_id, tab_id, step_index, kind, selector, value, risk, requires_approval, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![id, run_id, tab_id, step_index, kind, selector, value, risk, requires_approval, now_millis()],
        )?;
        Ok(id)
    }

    pub fn list_actions_for_run(&self, run_id: &str) -> Result<Vec<BrowserAction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT action_id, run_id, tab_id, step_index, kind, selector, value, risk, requires_approval, created_at
             FROM browser_actions WHERE run_id = ?1 ORDER BY step_index",
        )?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_action)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn request_browser_approval(&self, action_id: &str, user_id: &str) -> Result<String> {
        let id = format!("bappr_{}", Uuid::new_v4());
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO browser_approvals (approval_id, action_id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, action_id, user_id, ApprovalStatus::Pending, now],
        )?;
        Ok(id)
    }

    pub fn resolve_browser_approval(&self, approval_id: &str, approved: bool) -> Result<()> {
        let status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Denied };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE browser_approvals SET status = ?2, updated_at = ?3 WHERE approval_id = ?1",
            rusqlite::params![approval_id, status, now_millis()],
        )?;
        Ok(())
    }

    pub fn list_browser_approvals(&self, user_id: Option<&str>) -> Result<Vec<BrowserApproval>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT approval_id, action_id, user_id, status, created_at, updated_at
             FROM browser_approvals WHERE ?1 IS NULL OR user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id], row_to_approval)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Every browser action must get at least one audit row (spec §3 invariant).
    pub fn record_audit(
        &self,
        action_id: &str,
        before_screenshot: Option<&str>,
        after_screenshot: Option<&str>,
        selector_trace: serde_json::Value,
        outcome: &str,
    ) -> Result<String> {
        let id = format!("baudit_{}", Uuid::new_v4());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO browser_audits (audit_id, action_id, before_screenshot, after_screenshot, selector_trace, outcome, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id, action_id, before_screenshot, after_screenshot, selector_trace.to_string(), outcome, now_millis()],
        )?;
        Ok(id)
    }

    /// Selector trace for the most recent tab of `run_id`, in step order,
    /// joined against each action's outcome for replay planning (spec 4.I).
    pub fn selector_trace_for_run(&self, run_id: &str) -> Result<Vec<BrowserAudit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.audit_id, a.action_id, a.before_screenshot, a.after_screenshot, a.selector_trace, a.outcome, a.created_at
             FROM browser_audits a
             JOIN browser_actions act ON act.action_id = a.action_id
             WHERE act.run_id = ?1
             ORDER BY act.step_index, a.created_at",
        )?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_audit)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_tab(row: &rusqlite::Row<'_>) -> rusqlite::Result<BrowserTab> {
    let status_text: String = row.get(3)?;
    Ok(BrowserTab {
        tab_id: row.get(0)?,
        session_id: row.get(1)?,
        run_id: row.get(2)?,
        status: TabStatus::from_str(&status_text).unwrap_or(TabStatus::Error),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<BrowserAction> {
    let risk_text: String = row.get(7)?;
    Ok(BrowserAction {
        action_id: row.get(0)?,
        run_id: row.get(1)?,
        tab_id: row.get(2)?,
        step_index: row.get(3)?,
        kind: row.get(4)?,
        selector: row.get(5)?,
        value: row.get(6)?,
        risk: RiskLevel::from_str(&risk_text).unwrap_or(RiskLevel::Low),
        requires_approval: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_approval(row: &rusqlite::Row<'_>) -> rusqlite::Result<BrowserApproval> {
    let status_text: String = row.get(3)?;
    Ok(BrowserApproval {
        approval_id: row.get(0)?,
        action_id: row.get(1)?,
        user_id: row.get(2)?,
        status: ApprovalStatus::from_str(&status_text).unwrap_or(ApprovalStatus::Pending),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<BrowserAudit> {
    let trace_text: String = row.get(4)?;
    Ok(BrowserAudit {
        audit_id: row.get(0)?,
        action_id: row.get(1)?,
        before_screenshot: row.get(2)?,
        after_screenshot: row.get(3)?,
        selector_trace: serde_json::from_str(&trace_text).unwrap_or(serde_json::Value::Null),
        outcome: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_browser_sessions_returns_created_sessions() {
        let repo = Repository::open_in_memory().unwrap();
        repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        assert_eq!(repo.list_browser_sessions().unwrap().len(), 1);
    }

    #[test]
    fn list_tabs_filters_by_run_id() {
        let repo = Repository::open_in_memory().unwrap();
        let sess = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        repo.open_tab(&sess, "run_1").unwrap();
        repo.open_tab(&sess, "run_2").unwrap();
        assert_eq!(repo.list_tabs(None).unwrap().len(), 2);
        assert_eq!(repo.list_tabs(Some("run_1")).unwrap().len(), 1);
    }

    #[test]
    fn ensure_browser_session_is_idempotent_per_host_port() {
        let repo = Repository::open_in_memory().unwrap();
        let a = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        let b = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn open_tab_defaults_to_active() {
        let repo = Repository::open_in_memory().unwrap();
        let sess = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        let tab = repo.open_tab(&sess, "run_1").unwrap();
        let tab = repo.latest_tab_for_run("run_1").unwrap().unwrap();
        assert_eq!(tab.status, TabStatus::Active);
        let _ = tab.tab_id;
    }

    #[test]
    fn selector_trace_orders_by_step_index() {
        let repo = Repository::open_in_memory().unwrap();
        let sess = repo.ensure_browser_session("127.0.0.1", 9222, None).unwrap();
        let tab = repo.open_tab(&sess, "run_1").unwrap();
        let a1 = repo.record_action("run_1", &tab, 0, "navigate", None, Some("https://x"), RiskLevel::Low, false).unwrap();
        let a2 = repo.record_action("run_1", &tab, 1, "click", Some("#go"), None, RiskLevel::Low, false).unwrap();
        repo.record_audit(&a1, None, None, serde_json::json!({}), "completed").unwrap();
        repo.record_audit(&a2, None, None, serde_json::json!({}), "completed").unwrap();
        let trace = repo.selector_trace_for_run("run_1").unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].action_id, a1);
        assert_eq!(trace[1].action_id, a2);
    }
}
