// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Durable `proactive-state.json`: which digest targets have already been
//! sent today, so each is enqueued at most once per day (spec 4.M step 2).
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProactiveState {
    pub last_digest_date: Option<String>,
    #[serde(default)]
    pub digested_targets: Vec<String>,
}

impl ProactiveState {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path).ok().and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self).unwrap_or_default())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// `true` when `target_key` was already recorded for `date`.
    pub fn already_digested(&self, date: &str, target_key: &str) -> bool {
        self.last_digest_date.as_deref() == Some(date) && self.digested_targets.iter().any(|t| t == target_key)
    }

    /// Record `target_key` as digested for `date`, resetting the set when
    /// `date` rolls over from the previously recorded day.
    pub fn mark_digested(&mut self, date: &str, target_key: &str) {
        if self.last_digest_date.as_deref() != Some(date) {
            self.last_digest_date = Some(date.to_string());
            self.digested_targets.clear();
        }
        self.digested_targets.push(target_key.to_string());
    }
}
