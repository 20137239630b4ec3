// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const CANONICAL_DIRNAME: &str = ".tinyagi";
const LEGACY_DIRNAME: &str = ".tinyclaw";

/// Resolved process-wide state home. Resolved once at startup and then
/// threaded through everywhere paths are needed; tests construct one
/// directly over a `tempfile::TempDir` via [`StateHome::at`].
#[derive(Debug, Clone)]
pub struct StateHome {
    root: PathBuf,
}

impl StateHome {
    /// Use an explicit root, bypassing discovery/migration. Tests only.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the canonical state home: a repo-local `.tinyagi`/`.tinyclaw`
    /// next to the running binary takes priority; otherwise `~/.tinyagi`,
    /// migrating a legacy `~/.tinyclaw` the first time it is seen.
    pub fn resolve() -> anyhow::Result<Self> {
        if let Some(exe) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            let local_canonical = exe.join(CANONICAL_DIRNAME);
            if local_canonical.is_dir() {
                return Ok(Self { root: local_canonical });
            }
            let local_legacy = exe.join(LEGACY_DIRNAME);
            if local_legacy.is_dir() {
                return Ok(Self { root: local_legacy });
            }
        }

        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot resolve home directory"))?;
        let canonical = home.join(CANONICAL_DIRNAME);
        let legacy = home.join(LEGACY_DIRNAME);

        if !canonical.exists() && legacy.is_dir() {
            migrate_legacy(&legacy, &canonical)?;
        }
        if !canonical.exists() {
            std::fs::create_dir_all(&canonical)?;
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_incoming(&self) -> PathBuf {
        self.root.join("queue/incoming")
    }
    pub fn queue_processing(&self) -> PathBuf {
        self.root.join("queue/processing")
    }
    pub fn queue_outgoing(&self) -> PathBuf {
        self.root.join("queue/outgoing")
    }
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
    pub fn chats_dir(&self, team_id: &str) -> PathBuf {
        self.root.join("chats").join(team_id)
    }
    pub fn events_file(&self) -> PathBuf {
        self.root.join("events/stream.jsonl")
    }
    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }
    pub fn harness_dir(&self) -> PathBuf {
        self.root.join("harness")
    }
    pub fn harness_db_path(&self) -> PathBuf {
        self.harness_dir().join("state.db")
    }
    pub fn proactive_deferred_path(&self) -> PathBuf {
        self.harness_dir().join("proactive-deferred.jsonl")
    }
    pub fn proactive_state_path(&self) -> PathBuf {
        self.harness_dir().join("proactive-state.json")
    }
    pub fn browser_audit_dir(&self, run_id: &str, tab_id: &str) -> PathBuf {
        self.harness_dir().join("browser-audit").join(run_id).join(tab_id)
    }
    pub fn browser_profile_mirror_dir(&self) -> PathBuf {
        self.harness_dir().join("browser-profile-mirror")
    }
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }
    pub fn memory_raw_dir(&self) -> PathBuf {
        self.memory_dir().join("raw")
    }
    pub fn memory_daily_dir(&self) -> PathBuf {
        self.memory_dir().join("daily")
    }
    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }
    pub fn skill_dir(&self, skill_id: &str) -> PathBuf {
        self.skills_dir().join(skill_id)
    }
    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }
    pub fn pairing_path(&self) -> PathBuf {
        self.root.join("pairing.json")
    }

    /// Create every directory this state home is expected to contain.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            self.queue_incoming(),
            self.queue_processing(),
            self.queue_outgoing(),
            self.logs_dir(),
            self.files_dir(),
            self.harness_dir(),
            self.memory_raw_dir(),
            self.memory_daily_dir(),
            self.skills_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.events_file().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Copy `legacy` into `canonical` in full, verify parity by file count, then
/// replace `legacy` with a symlink pointing at `canonical` when possible.
fn migrate_legacy(legacy: &Path, canonical: &Path) -> anyhow::Result<()> {
    debug!(from = %legacy.display(), to = %canonical.display(), "migrating legacy state home");
    copy_dir_recursive(legacy, canonical)?;

    let src_count = count_files(legacy)?;
    let dst_count = count_files(canonical)?;
    if dst_count < src_count {
        anyhow::bail!(
            "state home migration parity check failed: source had {src_count} files, destination has {dst_count}"
        );
    }

    std::fs::remove_dir_all(legacy)?;
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(canonical, legacy).is_err() {
            warn!("could not symlink legacy state home after migration; legacy path left absent");
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut n = 0;
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        if entry.file_type().is_file() {
            n += 1;
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn state_home_at_exposes_root() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        assert_eq!(home.root(), dir.path());
    }

    #[test]
    fn queue_paths_nest_under_root() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        assert_eq!(home.queue_incoming(), dir.path().join("queue/incoming"));
        assert_eq!(home.queue_outgoing(), dir.path().join("queue/outgoing"));
    }

    #[test]
    fn harness_db_path_is_under_harness_dir() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        assert_eq!(home.harness_db_path(), home.harness_dir().join("state.db"));
    }

    #[test]
    fn ensure_layout_creates_expected_directories() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        home.ensure_layout().unwrap();
        assert!(home.queue_incoming().is_dir());
        assert!(home.queue_processing().is_dir());
        assert!(home.queue_outgoing().is_dir());
        assert!(home.skills_dir().is_dir());
    }

    #[test]
    fn migrate_legacy_copies_files_and_symlinks_source() {
        let parent = TempDir::new().unwrap();
        let legacy = parent.path().join(LEGACY_DIRNAME);
        std::fs::create_dir_all(legacy.join("memory")).unwrap();
        std::fs::write(legacy.join("memory/a.json"), b"{}").unwrap();

        let canonical = parent.path().join(CANONICAL_DIRNAME);
        migrate_legacy(&legacy, &canonical).unwrap();

        assert!(canonical.join("memory/a.json").is_file());
    }
}
