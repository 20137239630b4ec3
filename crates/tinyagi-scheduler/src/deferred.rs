// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSONL-buffered deferred outbox: non-urgent messages queued during quiet
//! hours, flushed once the window ends (spec 4.M step 1).
use std::io::Write;
use std::path::Path;

use tinyagi_queue::{MessageEnvelope, Spooler};

use crate::error::Result;

/// Append one envelope to the deferred buffer.
pub fn append_deferred(deferred_path: &Path, envelope: &MessageEnvelope) -> Result<()> {
    if let Some(parent) = deferred_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(deferred_path)?;
    writeln!(file, "{}", serde_json::to_string(envelope).unwrap_or_default())?;
    Ok(())
}

/// Move every buffered envelope into `outgoing/` and truncate the buffer.
/// Returns the number flushed. A missing buffer file flushes zero.
pub fn flush_deferred(deferred_path: &Path, spooler: &Spooler) -> Result<usize> {
    let Ok(contents) = std::fs::read_to_string(deferred_path) else {
        return Ok(0);
    };
    let mut flushed = 0;
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(envelope) = serde_json::from_str::<MessageEnvelope>(line) {
            spooler.write_outgoing(&envelope)?;
            flushed += 1;
        }
    }
    std::fs::write(deferred_path, "")?;
    Ok(flushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tinyagi_config::StateHome;

    fn envelope(msg_id: &str) -> MessageEnvelope {
        MessageEnvelope {
            channel: "whatsapp".into(),
            sender: "alice".into(),
            sender_id: Some("123".into()),
            message: "reminder".into(),
            timestamp: 1,
            message_id: msg_id.into(),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: None,
        }
    }

    #[test]
    fn flush_moves_buffered_envelopes_to_outgoing_and_truncates() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        let spooler = Spooler::new(home.clone());
        spooler.ensure_dirs().unwrap();
        let deferred_path = home.root().join("harness/proactive-deferred.jsonl");

        append_deferred(&deferred_path, &envelope("m1")).unwrap();
        append_deferred(&deferred_path, &envelope("m2")).unwrap();

        let flushed = flush_deferred(&deferred_path, &spooler).unwrap();
        assert_eq!(flushed, 2);
        assert_eq!(std::fs::read_to_string(&deferred_path).unwrap(), "");
        assert_eq!(std::fs::read_dir(home.queue_outgoing()).unwrap().count(), 2);
    }

    #[test]
    fn flush_missing_buffer_returns_zero() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        let spooler = Spooler::new(home.clone());
        spooler.ensure_dirs().unwrap();
        let deferred_path = home.root().join("harness/proactive-deferred.jsonl");
        assert_eq!(flush_deferred(&deferred_path, &spooler).unwrap(), 0);
    }
}
