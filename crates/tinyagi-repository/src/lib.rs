// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable relational repository (spec component A).
//!
//! Owns every durable row type the rest of the system reads or writes:
//! task runs/events/steps, memory records, permissions, the tool registry,
//! browser session/action/approval/audit/tab rows, the channel pending-
//! message store, metrics, and skills. The repository is the single writer
//! for each table; callers upsert by a declared natural key or append
//! unconditionally to event-shaped tables.
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

mod browser;
mod channels;
mod daily_summary;
mod error;
mod memory;
mod metrics;
mod model;
mod permissions;
mod skills;
mod tasks;

pub use error::{RepositoryError, Result};
pub use model::*;
pub use permissions::slugify;

/// Thin wrapper around a single `rusqlite::Connection`. All tables are
/// single-writer across the process (spec §5), so one mutex-guarded
/// connection is sufficient; callers on the async side should wrap calls in
/// `spawn_blocking` if they are made from a hot path.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    /// Open (creating if absent) the sqlite database at `path` and run
    /// migrations. Typically `StateHome::harness_db_path()`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::Migration(format!("creating {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.migrate()?;
        Ok(repo)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA).map_err(|e| RepositoryError::Migration(e.to_string()))?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_runs (
    run_id            TEXT PRIMARY KEY,
    task_id           TEXT NOT NULL,
    channel           TEXT NOT NULL,
    sender            TEXT NOT NULL,
    sender_id         TEXT,
    conversation_id   TEXT,
    branch_key        TEXT,
    objective         TEXT NOT NULL,
    risk_level        TEXT NOT NULL,
    status            TEXT NOT NULL,
    assigned_agent    TEXT NOT NULL,
    loop_iteration    INTEGER NOT NULL DEFAULT 0,
    max_iterations    INTEGER NOT NULL,
    verifier_outcome  TEXT,
    result_text       TEXT,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_runs_channel_sender ON task_runs(channel, sender_id);
CREATE INDEX IF NOT EXISTS idx_task_runs_status ON task_runs(status);

CREATE TABLE IF NOT EXISTS task_events (
    event_id    TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES task_runs(run_id),
    kind        TEXT NOT NULL,
    payload     TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_events_run ON task_events(run_id);

CREATE TABLE IF NOT EXISTS task_steps (
    step_id     TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES task_runs(run_id),
    iteration   INTEGER NOT NULL,
    kind        TEXT NOT NULL,
    payload     TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_steps_run ON task_steps(run_id);

CREATE TABLE IF NOT EXISTS memory_records (
    record_id       TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    category        TEXT NOT NULL,
    key             TEXT NOT NULL,
    value           TEXT NOT NULL,
    confidence      REAL NOT NULL,
    source_run_id   TEXT,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    UNIQUE(user_id, category, key)
);

CREATE TABLE IF NOT EXISTS permissions (
    permission_id   TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    subject         TEXT NOT NULL,
    action          TEXT NOT NULL,
    resource        TEXT,
    status          TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    UNIQUE(user_id, subject, action, resource)
);

CREATE TABLE IF NOT EXISTS tool_registry (
    tool_id     TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    source      TEXT NOT NULL,
    trust_class TEXT NOT NULL,
    status      TEXT NOT NULL,
    metadata    TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS browser_sessions (
    session_id   TEXT PRIMARY KEY,
    host         TEXT NOT NULL,
    port         INTEGER NOT NULL,
    profile_path TEXT,
    created_at   INTEGER NOT NULL,
    UNIQUE(host, port)
);

CREATE TABLE IF NOT EXISTS browser_tabs (
    tab_id      TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES browser_sessions(session_id),
    run_id      TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_browser_tabs_run ON browser_tabs(run_id);

CREATE TABLE IF NOT EXISTS browser_actions (
    action_id          TEXT PRIMARY KEY,
    run_id             TEXT NOT NULL,
    tab_id             TEXT NOT NULL REFERENCES browser_tabs(tab_id),
    step_index         INTEGER NOT NULL,
    kind               TEXT NOT NULL,
    selector           TEXT,
    value              TEXT,
    risk               TEXT NOT NULL,
    requires_approval  INTEGER NOT NULL,
    created_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_browser_actions_run ON browser_actions(run_id);

CREATE TABLE IF NOT EXISTS browser_approvals (
    approval_id  TEXT PRIMARY KEY,
    action_id    TEXT NOT NULL REFERENCES browser_actions(action_id),
    user_id      TEXT NOT NULL,
    status       TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS browser_audits (
    audit_id          TEXT PRIMARY KEY,
    action_id         TEXT NOT NULL REFERENCES browser_actions(action_id),
    before_screenshot TEXT,
    after_screenshot  TEXT,
    selector_trace    TEXT NOT NULL,
    outcome           TEXT NOT NULL,
    created_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_browser_audits_action ON browser_audits(action_id);

CREATE TABLE IF NOT EXISTS channel_pending_messages (
    message_id  TEXT PRIMARY KEY,
    channel     TEXT NOT NULL,
    sender      TEXT NOT NULL,
    sender_id   TEXT,
    chat_ref    TEXT NOT NULL,
    reply_ref   TEXT,
    expires_at  INTEGER NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pending_messages_channel ON channel_pending_messages(channel, message_id);

CREATE TABLE IF NOT EXISTS metrics (
    name   TEXT PRIMARY KEY,
    value  REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS metric_events (
    event_id    TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    delta       REAL NOT NULL,
    metadata    TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS skills (
    skill_id             TEXT PRIMARY KEY,
    name                 TEXT NOT NULL UNIQUE,
    status               TEXT NOT NULL,
    current_content_path TEXT NOT NULL,
    created_at           INTEGER NOT NULL,
    updated_at           INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS skill_versions (
    skill_id      TEXT NOT NULL REFERENCES skills(skill_id),
    version       INTEGER NOT NULL,
    content_path  TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    PRIMARY KEY (skill_id, version)
);

CREATE TABLE IF NOT EXISTS daily_summaries (
    summary_date  TEXT PRIMARY KEY,
    content_path  TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);
"#;

/// Current unix time in milliseconds. Centralized so repository tests can
/// reason about it and callers never reach for `SystemTime` directly.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
