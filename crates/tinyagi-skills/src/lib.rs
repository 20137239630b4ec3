// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Skills service: versioned skill drafts with auto-draft trigger detection
//! on verified repeated-workflow signals (spec component K).
pub mod draft;
pub mod error;
pub mod name;
pub mod trigger;

use std::path::Path;

use serde::Serialize;
use tinyagi_repository::{Skill, SkillStatus, SkillVersion};
use tracing::info;

use crate::draft::{render_skill_markdown, sync_current_file, write_version_file};
use crate::error::{Result, SkillsError};
use crate::name::{derive_skill_name, normalize_name};
use crate::trigger::should_auto_draft;

/// Outcome of an auto-draft attempt (S5: `{created:true, skillId:"skill_…"}`).
#[derive(Debug, Clone, Serialize)]
pub struct AutoDraftResult {
    pub created: bool,
    pub skill_id: Option<String>,
}

/// Evaluate a verified run's objective for an auto-draft trigger and, if one
/// fires and no skill with the derived normalized name already exists,
/// create a version-1 draft.
pub fn auto_draft(repo: &tinyagi_repository::Repository, skills_dir: &Path, objective: &str, route: &str, verified: bool) -> Result<AutoDraftResult> {
    if !should_auto_draft(objective, route, verified) {
        return Ok(AutoDraftResult { created: false, skill_id: None });
    }

    let name = derive_skill_name(objective);
    if let Some(existing) = repo.find_skill_by_name(&name)? {
        return Ok(AutoDraftResult { created: false, skill_id: Some(existing.skill_id) });
    }

    let content = render_skill_markdown(&name, objective, 1, objective);
    let version_path = write_version_file(skills_dir, &name, 1, &content)?;
    let skill_id = repo.create_skill_draft(&name, &version_path)?;

    info!(skill_id, name, "auto-drafted skill from verified run objective");
    Ok(AutoDraftResult { created: true, skill_id: Some(skill_id) })
}

/// Create a manual draft (`skills draft <name> <prompt>`), deduping by
/// normalized name.
pub fn draft_skill(repo: &tinyagi_repository::Repository, skills_dir: &Path, name: &str, prompt: &str) -> Result<String> {
    let normalized = normalize_name(name);
    if let Some(existing) = repo.find_skill_by_name(&normalized)? {
        return Ok(existing.skill_id);
    }
    let content = render_skill_markdown(&normalized, prompt, 1, prompt);
    let version_path = write_version_file(skills_dir, &normalized, 1, &content)?;
    let skill_id = repo.create_skill_draft(&normalized, &version_path)?;
    Ok(skill_id)
}

pub fn activate_skill(repo: &tinyagi_repository::Repository, skill_id: &str) -> Result<()> {
    repo.set_skill_status(skill_id, SkillStatus::Active)?;
    Ok(())
}

pub fn disable_skill(repo: &tinyagi_repository::Repository, skill_id: &str) -> Result<()> {
    repo.set_skill_status(skill_id, SkillStatus::Disabled)?;
    Ok(())
}

/// Add a new version to an existing skill from revised prompt content.
pub fn add_version(repo: &tinyagi_repository::Repository, skills_dir: &Path, skill_id: &str, prompt: &str) -> Result<u32> {
    let skill = repo.get_skill(skill_id)?.ok_or_else(|| SkillsError::NotFound(skill_id.to_string()))?;
    let versions = repo.list_skill_versions(skill_id)?;
    let next = versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
    let content = render_skill_markdown(&skill.name, prompt, next, prompt);
    let path = write_version_file(skills_dir, &skill.name, next, &content)?;
    repo.add_skill_version(skill_id, &path)?;
    Ok(next)
}

/// Roll the skill's current content back to `version`, or to the most
/// recent prior version when `version` is `None`.
pub fn rollback_skill(repo: &tinyagi_repository::Repository, skills_dir: &Path, skill_id: &str, version: Option<u32>) -> Result<u32> {
    let mut versions = repo.list_skill_versions(skill_id)?;
    if versions.is_empty() {
        return Err(SkillsError::NotFound(skill_id.to_string()));
    }
    versions.sort_by_key(|v| v.version);

    let target = match version {
        Some(v) => v,
        None => {
            if versions.len() < 2 {
                return Err(SkillsError::VersionNotFound(0, skill_id.to_string()));
            }
            versions[versions.len() - 2].version
        }
    };
    if !versions.iter().any(|v| v.version == target) {
        return Err(SkillsError::VersionNotFound(target, skill_id.to_string()));
    }

    repo.rollback_skill(skill_id, target)?;
    let skill = repo.get_skill(skill_id)?.ok_or_else(|| SkillsError::NotFound(skill_id.to_string()))?;
    sync_current_file(skills_dir, &skill.name, &skill.current_content_path)?;
    Ok(target)
}

pub fn get_skill(repo: &tinyagi_repository::Repository, skill_id: &str) -> Result<Option<Skill>> {
    Ok(repo.get_skill(skill_id)?)
}

pub fn list_skills(repo: &tinyagi_repository::Repository) -> Result<Vec<Skill>> {
    Ok(repo.list_skills()?)
}

pub fn list_skill_versions(repo: &tinyagi_repository::Repository, skill_id: &str) -> Result<Vec<SkillVersion>> {
    Ok(repo.list_skill_versions(skill_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tinyagi_repository::Repository;

    #[test]
    fn auto_draft_creates_skill_on_trigger_phrase() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let result = auto_draft(&repo, tmp.path(), "Always do this workflow abc123: run npm test and summarize failures.", "tooling", true).unwrap();
        assert!(result.created);
        let skill_id = result.skill_id.unwrap();
        assert!(skill_id.starts_with("skill_"));

        let versions = list_skill_versions(&repo, &skill_id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
    }

    #[test]
    fn auto_draft_skips_when_not_verified() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let result = auto_draft(&repo, tmp.path(), "always do this workflow", "tooling", false).unwrap();
        assert!(!result.created);
        assert!(result.skill_id.is_none());
    }

    #[test]
    fn auto_draft_dedups_by_normalized_name() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let first = auto_draft(&repo, tmp.path(), "Always do this workflow: run npm test.", "tooling", true).unwrap();
        let second = auto_draft(&repo, tmp.path(), "Always do this workflow: run npm test.", "tooling", true).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.skill_id, second.skill_id);
    }

    #[test]
    fn activate_and_disable_round_trip() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let skill_id = draft_skill(&repo, tmp.path(), "Deploy Helper", "deploy the app").unwrap();
        activate_skill(&repo, &skill_id).unwrap();
        assert_eq!(get_skill(&repo, &skill_id).unwrap().unwrap().status, SkillStatus::Active);
        disable_skill(&repo, &skill_id).unwrap();
        assert_eq!(get_skill(&repo, &skill_id).unwrap().unwrap().status, SkillStatus::Disabled);
    }

    #[test]
    fn add_version_then_rollback_restores_prior_content() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let skill_id = draft_skill(&repo, tmp.path(), "deploy helper", "deploy v1").unwrap();
        add_version(&repo, tmp.path(), &skill_id, "deploy v2").unwrap();

        let before = get_skill(&repo, &skill_id).unwrap().unwrap();
        assert!(std::fs::read_to_string(&before.current_content_path).unwrap().contains("deploy v2"));

        let restored = rollback_skill(&repo, tmp.path(), &skill_id, Some(1)).unwrap();
        assert_eq!(restored, 1);
        let after = get_skill(&repo, &skill_id).unwrap().unwrap();
        assert!(std::fs::read_to_string(&after.current_content_path).unwrap().contains("deploy v1"));

        let canonical = tmp.path().join(&after.name).join("SKILL.md");
        assert!(std::fs::read_to_string(&canonical).unwrap().contains("deploy v1"));
    }

    #[test]
    fn rollback_with_no_version_argument_uses_most_recent_prior() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let skill_id = draft_skill(&repo, tmp.path(), "s", "v1").unwrap();
        add_version(&repo, tmp.path(), &skill_id, "v2").unwrap();
        add_version(&repo, tmp.path(), &skill_id, "v3").unwrap();

        let restored = rollback_skill(&repo, tmp.path(), &skill_id, None).unwrap();
        assert_eq!(restored, 2);
    }

    #[test]
    fn rollback_unknown_version_errors() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        let skill_id = draft_skill(&repo, tmp.path(), "s", "v1").unwrap();
        let err = rollback_skill(&repo, tmp.path(), &skill_id, Some(99));
        assert!(err.is_err());
    }

    #[test]
    fn list_skills_returns_draft() {
        let repo = Repository::open_in_memory().unwrap();
        let tmp = TempDir::new().unwrap();
        draft_skill(&repo, tmp.path(), "s", "v1").unwrap();
        let all = list_skills(&repo).unwrap();
        assert_eq!(all.len(), 1);
    }
}
