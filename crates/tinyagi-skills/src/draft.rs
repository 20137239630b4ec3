// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Markdown `SKILL.md` rendering and on-disk layout for skill versions.
//!
//! Each version is written to `<skills_dir>/<name>/v<version>.md`, keyed by
//! the skill's normalized name (known before the repository assigns a
//! `skill_id`), so prior versions remain addressable for rollback;
//! `<skills_dir>/<name>/SKILL.md` is kept in sync with whichever version is
//! current.
use std::path::{Path, PathBuf};

use crate::error::Result;

fn skill_dir(skills_dir: &Path, name: &str) -> PathBuf {
    skills_dir.join(name)
}

/// Render a `SKILL.md` body: YAML frontmatter (`name`, `description`,
/// `version`) followed by the prompt content.
pub fn render_skill_markdown(name: &str, description: &str, version: u32, body: &str) -> String {
    format!("---\nname: {name}\ndescription: |\n  {description}\nversion: {version}\n---\n\n{body}\n")
}

/// Write a new version file under `name`'s skill directory and sync the
/// canonical `SKILL.md` pointer to its content. Returns the version file's
/// path.
pub fn write_version_file(skills_dir: &Path, name: &str, version: u32, content: &str) -> Result<String> {
    let dir = skill_dir(skills_dir, name);
    std::fs::create_dir_all(&dir)?;
    let version_path = dir.join(format!("v{version}.md"));
    std::fs::write(&version_path, content)?;
    std::fs::write(dir.join("SKILL.md"), content)?;
    Ok(version_path.to_string_lossy().to_string())
}

/// Re-point the canonical `SKILL.md` file at `content_path`'s contents
/// (used after activate/disable/rollback change the current version).
pub fn sync_current_file(skills_dir: &Path, name: &str, content_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(content_path)?;
    let dir = skill_dir(skills_dir, name);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("SKILL.md"), content)?;
    Ok(())
}
