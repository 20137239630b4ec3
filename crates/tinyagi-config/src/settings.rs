// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime-mutable overrides written to `settings.json` (spec §6): the
//! handful of knobs the CLI flips live (`harness enable/disable/autonomy`)
//! without editing the layered YAML config. Loaded after `Config` and
//! applied on top of it.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Autonomy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub harness_enabled: Option<bool>,
    pub autonomy: Option<Autonomy>,
}

impl Settings {
    /// Missing or unparsable file reads as "no overrides yet" rather than
    /// an error — a fresh state home has no `settings.json`.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Atomic tmp+rename write, matching the queue's own atomic-write
    /// convention for every other durable file under the state home.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn apply(&self, config: &mut crate::Config) {
        if let Some(enabled) = self.harness_enabled {
            config.harness.enabled = enabled;
        }
        if let Some(autonomy) = self.autonomy {
            config.harness.autonomy = autonomy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert!(settings.harness_enabled.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings { harness_enabled: Some(false), autonomy: Some(Autonomy::Strict) };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path);
        assert_eq!(loaded.harness_enabled, Some(false));
        assert_eq!(loaded.autonomy, Some(Autonomy::Strict));
    }

    #[test]
    fn apply_overrides_config_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings { harness_enabled: Some(false), autonomy: Some(Autonomy::Low) };
        settings.save(&path).unwrap();

        let mut config = crate::Config::default();
        assert!(config.harness.enabled);
        Settings::load(&path).apply(&mut config);
        assert!(!config.harness.enabled);
        assert_eq!(config.harness.autonomy, Autonomy::Low);
    }
}
