// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Mirrors a Chrome user-data directory into a scratch location so the
//! harness can launch its own browser instance without fighting the
//! user's live profile lock (spec 4.I session setup, §9 "mirrored
//! browser profile" design note).
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Directories never copied into the mirror: they are large, purely
/// cache-derived, and safe to lose.
const EXCLUDED_DIRS: [&str; 7] = ["Cache", "Code Cache", "GPUCache", "ShaderCache", "GrShaderCache", "DawnCache", "Media Cache"];

const STALE_AFTER_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MirrorMetadata {
    source: String,
    profile: String,
    prepared_at: u64,
}

fn metadata_path(mirror_dir: &Path) -> PathBuf {
    mirror_dir.join(".mirror-metadata.json")
}

fn now_unix() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn read_metadata(mirror_dir: &Path) -> Option<MirrorMetadata> {
    let text = std::fs::read_to_string(metadata_path(mirror_dir)).ok()?;
    serde_json::from_str(&text).ok()
}

fn write_metadata(mirror_dir: &Path, meta: &MirrorMetadata) -> std::io::Result<()> {
    std::fs::write(metadata_path(mirror_dir), serde_json::to_string(meta).unwrap_or_default())
}

/// True when the existing mirror (if any) is fresh enough to reuse:
/// same source/profile and prepared less than 2 minutes ago.
fn is_fresh(mirror_dir: &Path, source: &str, profile: &str, now: u64) -> bool {
    match read_metadata(mirror_dir) {
        Some(meta) => meta.source == source && meta.profile == profile && now.saturating_sub(meta.prepared_at) < STALE_AFTER_SECS,
        None => false,
    }
}

fn copy_dir_excluding(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if EXCLUDED_DIRS.iter().any(|excluded| *excluded == name_str) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_excluding(&from, &to)?;
        } else if file_type.is_file() {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Ensure `mirror_dir` holds a fresh copy of `source_profile_dir`
/// (`<user-data-dir>/<profile>`), refreshing only when stale or the
/// source has changed. Returns the path unchanged either way.
pub fn ensure_mirror(source_user_data_dir: &Path, profile: &str, mirror_dir: &Path) -> Result<PathBuf> {
    let source = source_user_data_dir.to_string_lossy().to_string();
    let now = now_unix();

    if is_fresh(mirror_dir, &source, profile, now) {
        debug!(mirror = %mirror_dir.display(), "reusing fresh browser profile mirror");
        return Ok(mirror_dir.to_path_buf());
    }

    let source_profile_dir = source_user_data_dir.join(profile);
    copy_dir_excluding(&source_profile_dir, &mirror_dir.join(profile))?;

    write_metadata(mirror_dir, &MirrorMetadata { source, profile: profile.to_string(), prepared_at: now })?;
    Ok(mirror_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_profile(root: &Path, profile: &str) {
        std::fs::create_dir_all(root.join(profile)).unwrap();
        std::fs::write(root.join(profile).join("Cookies"), b"data").unwrap();
        std::fs::create_dir_all(root.join(profile).join("Cache")).unwrap();
        std::fs::write(root.join(profile).join("Cache").join("blob"), b"junk").unwrap();
    }

    #[test]
    fn ensure_mirror_copies_profile_excluding_cache() {
        let source = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        make_profile(source.path(), "Default");

        ensure_mirror(source.path(), "Default", mirror.path()).unwrap();

        assert!(mirror.path().join("Default").join("Cookies").exists());
        assert!(!mirror.path().join("Default").join("Cache").exists());
    }

    #[test]
    fn ensure_mirror_is_reused_when_fresh() {
        let source = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        make_profile(source.path(), "Default");

        ensure_mirror(source.path(), "Default", mirror.path()).unwrap();
        std::fs::remove_file(source.path().join("Default").join("Cookies")).unwrap();
        ensure_mirror(source.path(), "Default", mirror.path()).unwrap();

        assert!(mirror.path().join("Default").join("Cookies").exists());
    }

    #[test]
    fn is_fresh_false_when_no_metadata_present() {
        let mirror = TempDir::new().unwrap();
        assert!(!is_fresh(mirror.path(), "/src", "Default", now_unix()));
    }

    #[test]
    fn is_fresh_false_when_profile_differs() {
        let mirror = TempDir::new().unwrap();
        write_metadata(mirror.path(), &MirrorMetadata { source: "/src".into(), profile: "Default".into(), prepared_at: now_unix() }).unwrap();
        assert!(!is_fresh(mirror.path(), "/src", "Other", now_unix()));
    }

    #[test]
    fn is_fresh_false_when_stale() {
        let mirror = TempDir::new().unwrap();
        let old = now_unix().saturating_sub(STALE_AFTER_SECS + 10);
        write_metadata(mirror.path(), &MirrorMetadata { source: "/src".into(), profile: "Default".into(), prepared_at: old }).unwrap();
        assert!(!is_fresh(mirror.path(), "/src", "Default", now_unix()));
    }
}
