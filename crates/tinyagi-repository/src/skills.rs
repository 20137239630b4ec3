// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use uuid::Uuid;

use crate::model::{Skill, SkillStatus, SkillVersion};
use crate::{now_millis, Repository, Result};

impl Repository {
    pub fn find_skill_by_name(&self, normalized_name: &str) -> Result<Option<Skill>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT skill_id, name, status, current_content_path, created_at, updated_at
                 FROM skills WHERE name = ?1",
                rusqlite::params![normalized_name],
                row_to_skill,
            )
            .ok();
        Ok(row)
    }

    pub fn create_skill_draft(&self, name: &str, content_path: &str) -> Result<String> {
        let id = format!("skill_{}", Uuid::new_v4());
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO skills (skill_id, name, status, current_content_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![id, name, SkillStatus::Draft, content_path, now],
        )?;
        conn.execute(
            "INSERT INTO skill_versions (skill_id, version, content_path, created_at) VALUES (?1, 1, ?2, ?3)",
            rusqlite::params![id, content_path, now],
        )?;
        Ok(id)
    }

    pub fn get_skill(&self, skill_id: &str) -> Result<Option<Skill>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT skill_id, name, status, current_content_path, created_at, updated_at
                 FROM skills WHERE skill_id = ?1",
                rusqlite::params![skill_id],
                row_to_skill,
            )
            .ok();
        Ok(row)
    }

    pub fn list_skills(&self) -> Result<Vec<Skill>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT skill_id, name, status, current_content_path, created_at, updated_at FROM skills ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_skill)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn set_skill_status(&self, skill_id: &str, status: SkillStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE skills SET status = ?2, updated_at = ?3 WHERE skill_id = ?1",
            rusqlite::params![skill_id, status, now_millis()],
        )?;
        Ok(())
    }

    pub fn add_skill_version(&self, skill_id: &str, content_path: &str) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let next: u32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM skill_versions WHERE skill_id = ?1",
                rusqlite::params![skill_id],
                |row| row.get(0),
            )?;
        let now = now_millis();
        conn.execute(
            "INSERT INTO skill_versions (skill_id, version, content_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![skill_id, next, content_path, now],
        )?;
        conn.execute(
            "UPDATE skills SET current_content_path = ?2, updated_at = ?3 WHERE skill_id = ?1",
            rusqlite::params![skill_id, content_path, now],
        )?;
        Ok(next)
    }

    pub fn list_skill_versions(&self, skill_id: &str) -> Result<Vec<SkillVersion>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT skill_id, version, content_path, created_at FROM skill_versions WHERE skill_id = ?1 ORDER BY version",
        )?;
        let rows = stmt.query_map(rusqlite::params![skill_id], |row| {
            Ok(SkillVersion {
                skill_id: row.get(0)?,
                version: row.get(1)?,
                content_path: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Roll back `current_content_path` to a prior version's path (spec 4.K).
    pub fn rollback_skill(&self, skill_id: &str, version: u32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let path: String = conn.query_row(
            "SELECT content_path FROM skill_versions WHERE skill_id = ?1 AND version = ?2",
            rusqlite::params![skill_id, version],
            |row| row.get(0),
        )?;
        conn.execute(
            "UPDATE skills SET current_content_path = ?2, updated_at = ?3 WHERE skill_id = ?1",
            rusqlite::params![skill_id, path, now_millis()],
        )?;
        Ok(())
    }
}

fn row_to_skill(row: &rusqlite::Row<'_>) -> rusqlite::Result<Skill> {
    let status_text: String = row.get(2)?;
    Ok(Skill {
        skill_id: row.get(0)?,
        name: row.get(1)?,
        status: SkillStatus::from_str(&status_text).unwrap_or(SkillStatus::Draft),
        current_content_path: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
