// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use rand::Rng;
use tinyagi_config::StateHome;
use tracing::{debug, warn};

use crate::envelope::MessageEnvelope;
use crate::error::{QueueError, Result};

/// Directory-based incoming/processing/outgoing queue (spec 4.B).
pub struct Spooler {
    home: StateHome,
}

impl Spooler {
    pub fn new(home: StateHome) -> Self {
        Self { home }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.home.queue_incoming(), self.home.queue_processing(), self.home.queue_outgoing()] {
            std::fs::create_dir_all(&dir).map_err(|e| QueueError::Io { path: dir, source: e })?;
        }
        Ok(())
    }

    /// On startup, move every file left in `processing/` back to `incoming/`
    /// (spec 4.B crash recovery / spec §8 crash-recovery property).
    pub fn recover(&self) -> Result<usize> {
        self.ensure_dirs()?;
        let processing = self.home.queue_processing();
        let mut recovered = 0;
        for entry in std::fs::read_dir(&processing).map_err(|e| QueueError::Io { path: processing.clone(), source: e })? {
            let entry = entry.map_err(|e| QueueError::Io { path: processing.clone(), source: e })?;
            if !entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                continue;
            }
            let dest = self.home.queue_incoming().join(entry.file_name());
            atomic_rename(&entry.path(), &dest)?;
            recovered += 1;
        }
        if recovered > 0 {
            warn!(count = recovered, "recovered orphaned processing/ files on startup");
        }
        Ok(recovered)
    }

    /// List `*.json` files under `incoming/`, sorted by mtime ascending
    /// (spec 4.N: "sort by mtime, iterate").
    pub fn list_incoming(&self) -> Result<Vec<PathBuf>> {
        list_json_sorted_by_mtime(&self.home.queue_incoming())
    }

    pub fn read_envelope(&self, path: &Path) -> Result<MessageEnvelope> {
        let text = std::fs::read_to_string(path).map_err(|e| QueueError::Io { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&text).map_err(|e| QueueError::Malformed { path: path.to_path_buf(), source: e })
    }

    /// Claim a message by renaming it into `processing/`. Same-filesystem
    /// rename is atomic and is the sole mutual-exclusion mechanism (spec §5).
    pub fn claim(&self, incoming_path: &Path) -> Result<PathBuf> {
        let dest = self.home.queue_processing().join(
            incoming_path.file_name().expect("queue file always has a name"),
        );
        atomic_rename(incoming_path, &dest)?;
        Ok(dest)
    }

    /// On handler failure, move the claimed file back to `incoming/` for retry.
    pub fn release_back_to_incoming(&self, processing_path: &Path) -> Result<()> {
        let dest = self.home.queue_incoming().join(
            processing_path.file_name().expect("queue file always has a name"),
        );
        atomic_rename(processing_path, &dest)
    }

    pub fn delete_processing(&self, processing_path: &Path) -> Result<()> {
        std::fs::remove_file(processing_path).map_err(|e| QueueError::Io { path: processing_path.to_path_buf(), source: e })
    }

    /// Write an envelope into `outgoing/` using the spec's filename scheme.
    pub fn write_outgoing(&self, envelope: &MessageEnvelope) -> Result<PathBuf> {
        let filename = outgoing_filename(&envelope.channel, &envelope.message_id, envelope.timestamp);
        let path = self.home.queue_outgoing().join(filename);
        write_json_atomic(&path, envelope)?;
        debug!(path = %path.display(), "wrote outgoing envelope");
        Ok(path)
    }

    /// Write an internal (team re-enqueue) envelope directly into `incoming/`.
    pub fn write_internal(&self, envelope: &MessageEnvelope, conversation_id: &str, target_agent: &str, now_millis: i64) -> Result<PathBuf> {
        let rand_suffix: u32 = rand::thread_rng().gen();
        let filename = format!("internal_{conversation_id}_{target_agent}_{now_millis}_{rand_suffix:08x}.json");
        let path = self.home.queue_incoming().join(filename);
        write_json_atomic(&path, envelope)?;
        Ok(path)
    }

    pub fn home(&self) -> &StateHome {
        &self.home
    }
}

/// Incoming filenames are adapter-prefixed; this helper matches the spec's
/// example (`whatsapp_<msgId>.json`).
pub fn incoming_filename(channel: &str, message_id: &str) -> String {
    format!("{channel}_{message_id}.json")
}

/// `<channel>_<msgId>_<ts>.json`, except the heartbeat pseudo-channel which
/// uses `<msgId>.json` directly (spec 4.B, §6).
pub fn outgoing_filename(channel: &str, message_id: &str, now_millis: i64) -> String {
    if channel == "heartbeat" {
        format!("{message_id}.json")
    } else {
        format!("{channel}_{message_id}_{now_millis}.json")
    }
}

fn list_json_sorted_by_mtime(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| QueueError::Io { path: dir.to_path_buf(), source: e })? {
        let entry = entry.map_err(|e| QueueError::Io { path: dir.to_path_buf(), source: e })?;
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let meta = entry.metadata().map_err(|e| QueueError::Io { path: path.clone(), source: e })?;
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((mtime, path));
        }
    }
    entries.sort_by_key(|(mtime, _)| *mtime);
    Ok(entries.into_iter().map(|(_, p)| p).collect())
}

fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| QueueError::Io { path: from.to_path_buf(), source: e })
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(value).expect("envelope is always serializable");
    std::fs::write(&tmp, text).map_err(|e| QueueError::Io { path: tmp.clone(), source: e })?;
    atomic_rename(&tmp, path)
}
