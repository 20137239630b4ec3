// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use uuid::Uuid;

use crate::model::{Permission, PermissionStatus, ToolRegistryRow, ToolStatus, TrustClass};
use crate::{now_millis, Repository, Result};

impl Repository {
    pub fn find_active_permission(&self, user_id: &str, subject: &str, action: &str) -> Result<Option<Permission>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT permission_id, user_id, subject, action, resource, status, created_at, updated_at
                 FROM permissions WHERE user_id = ?1 AND subject = ?2 AND action = ?3 AND status = ?4",
                rusqlite::params![user_id, subject, action, PermissionStatus::Active],
                row_to_permission,
            )
            .ok();
        Ok(row)
    }

    /// Create a `pending` permission request, returning its fresh id.
    pub fn request_permission(&self, user_id: &str, subject: &str, action: &str, resource: Option<&str>) -> Result<String> {
        let id = format!("perm_{}", Uuid::new_v4());
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO permissions (permission_id, user_id, subject, action, resource, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(user_id, subject, action, resource) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            rusqlite::params![id, user_id, subject, action, resource, PermissionStatus::Pending, now],
        )?;
        Ok(id)
    }

    pub fn grant_permission(&self, user_id: &str, subject: &str, action: &str, resource: Option<&str>) -> Result<String> {
        let id = format!("perm_{}", Uuid::new_v4());
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO permissions (permission_id, user_id, subject, action, resource, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(user_id, subject, action, resource) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            rusqlite::params![id, user_id, subject, action, resource, PermissionStatus::Active, now],
        )?;
        Ok(id)
    }

    pub fn revoke_permission(&self, permission_id: &str) -> Result<()> {
        self.set_permission_status(permission_id, PermissionStatus::Revoked)
    }

    /// Resolve a pending approval request (`/approve <id>` / `/deny <id>`).
    pub fn set_permission_status(&self, permission_id: &str, status: PermissionStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE permissions SET status = ?2, updated_at = ?3 WHERE permission_id = ?1",
            rusqlite::params![permission_id, status, now_millis()],
        )?;
        Ok(())
    }

    pub fn get_permission(&self, permission_id: &str) -> Result<Option<Permission>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT permission_id, user_id, subject, action, resource, status, created_at, updated_at
                 FROM permissions WHERE permission_id = ?1",
                rusqlite::params![permission_id],
                row_to_permission,
            )
            .ok())
    }

    pub fn list_permissions(&self, user_id: Option<&str>) -> Result<Vec<Permission>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT permission_id, user_id, subject, action, resource, status, created_at, updated_at
             FROM permissions WHERE ?1 IS NULL OR user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id], row_to_permission)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Register a tool row if new; existing rows are left untouched.
    pub fn register_tool_if_new(&self, name: &str, source: &str, trust_class: TrustClass) -> Result<String> {
        let slug = slugify(name);
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tool_registry (tool_id, name, source, trust_class, status, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(name) DO NOTHING",
            rusqlite::params![slug, name, source, trust_class, ToolStatus::Pending, "{}", now],
        )?;
        Ok(slug)
    }

    pub fn set_tool_status(&self, name: &str, status: ToolStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tool_registry SET status = ?2, updated_at = ?3 WHERE name = ?1",
            rusqlite::params![name, status, now_millis()],
        )?;
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Result<Option<ToolRegistryRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT tool_id, name, source, trust_class, status, metadata, created_at, updated_at
                 FROM tool_registry WHERE name = ?1",
                rusqlite::params![name],
                row_to_tool,
            )
            .ok();
        Ok(row)
    }

    pub fn list_tools(&self) -> Result<Vec<ToolRegistryRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT tool_id, name, source, trust_class, status, metadata, created_at, updated_at
             FROM tool_registry ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_tool)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

/// Lowercase, hyphenated slug used as a stable tool id.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn row_to_permission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Permission> {
    let status_text: String = row.get(5)?;
    Ok(Permission {
        permission_id: row.get(0)?,
        user_id: row.get(1)?,
        subject: row.get(2)?,
        action: row.get(3)?,
        resource: row.get(4)?,
        status: PermissionStatus::from_str(&status_text).unwrap_or(PermissionStatus::Pending),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_tool(row: &rusqlite::Row<'_>) -> rusqlite::Result<ToolRegistryRow> {
    let trust_text: String = row.get(3)?;
    let status_text: String = row.get(4)?;
    let metadata_text: String = row.get(5)?;
    Ok(ToolRegistryRow {
        tool_id: row.get(0)?,
        name: row.get(1)?,
        source: row.get(2)?,
        trust_class: TrustClass::from_str(&trust_text).unwrap_or(TrustClass::Unknown),
        status: ToolStatus::from_str(&status_text).unwrap_or(ToolStatus::Pending),
        metadata: serde_json::from_str(&metadata_text).unwrap_or(serde_json::Value::Null),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation_and_lowercases() {
        assert_eq!(slugify("NPM CLI!"), "npm-cli");
        assert_eq!(slugify("git"), "git");
    }

    #[test]
    fn set_permission_status_resolves_a_pending_request() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.request_permission("u", "tool:curl", "execute", None).unwrap();
        repo.set_permission_status(&id, PermissionStatus::Active).unwrap();
        assert_eq!(repo.get_permission(&id).unwrap().unwrap().status, PermissionStatus::Active);
    }

    #[test]
    fn get_permission_returns_none_for_unknown_id() {
        let repo = Repository::open_in_memory().unwrap();
        assert!(repo.get_permission("perm_nope").unwrap().is_none());
    }

    #[test]
    fn no_active_permission_until_granted() {
        let repo = Repository::open_in_memory().unwrap();
        assert!(repo.find_active_permission("u", "npm", "execute").unwrap().is_none());
        repo.grant_permission("u", "npm", "execute", None).unwrap();
        assert!(repo.find_active_permission("u", "npm", "execute").unwrap().is_some());
    }

    #[test]
    fn request_permission_is_pending_not_active() {
        let repo = Repository::open_in_memory().unwrap();
        repo.request_permission("u", "npm", "execute", None).unwrap();
        assert!(repo.find_active_permission("u", "npm", "execute").unwrap().is_none());
    }

    #[test]
    fn revoke_permission_clears_active_lookup() {
        let repo = Repository::open_in_memory().unwrap();
        let id = repo.grant_permission("u", "npm", "execute", None).unwrap();
        repo.revoke_permission(&id).unwrap();
        assert!(repo.find_active_permission("u", "npm", "execute").unwrap().is_none());
    }

    #[test]
    fn register_tool_if_new_is_idempotent() {
        let repo = Repository::open_in_memory().unwrap();
        let id1 = repo.register_tool_if_new("npm", "npmjs.com", TrustClass::Mainstream).unwrap();
        let id2 = repo.register_tool_if_new("npm", "npmjs.com", TrustClass::Mainstream).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(repo.list_tools().unwrap().len(), 1);
    }
}
