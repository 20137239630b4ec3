// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use crate::error::{InvokerError, Result};

/// Ensure the per-agent workspace directory exists, returning its path.
pub fn ensure_workspace(base: &Path, agent_id: &str, configured: Option<&str>) -> Result<PathBuf> {
    let dir = match configured {
        Some(p) => PathBuf::from(p),
        None => base.join(agent_id),
    };
    std::fs::create_dir_all(&dir).map_err(InvokerError::Io)?;
    Ok(dir)
}

/// Write the teammate-context file consulted by agents that hand off work
/// via `[@teammate: ...]` (spec 4.D, 4.C).
pub fn write_teammate_context(workspace: &Path, context: &str) -> Result<()> {
    let path = workspace.join("TEAMMATE_CONTEXT.md");
    std::fs::write(path, context).map_err(InvokerError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_workspace_creates_default_subdir() {
        let base = TempDir::new().unwrap();
        let dir = ensure_workspace(base.path(), "alpha", None).unwrap();
        assert!(dir.ends_with("alpha"));
        assert!(dir.is_dir());
    }

    #[test]
    fn ensure_workspace_honors_configured_path() {
        let base = TempDir::new().unwrap();
        let custom = base.path().join("custom");
        let dir = ensure_workspace(base.path(), "alpha", Some(custom.to_str().unwrap())).unwrap();
        assert_eq!(dir, custom);
        assert!(dir.is_dir());
    }

    #[test]
    fn write_teammate_context_creates_file() {
        let base = TempDir::new().unwrap();
        let dir = ensure_workspace(base.path(), "alpha", None).unwrap();
        write_teammate_context(&dir, "team: alpha, beta").unwrap();
        let content = std::fs::read_to_string(dir.join("TEAMMATE_CONTEXT.md")).unwrap();
        assert_eq!(content, "team: alpha, beta");
    }
}
