// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Daily digest: build today's memory summary once, enqueue it to every
//! distinct `(channel, senderId)` target that hasn't seen it yet today
//! (spec 4.M step 2).
use std::path::Path;

use tinyagi_memory::generate_daily_summary;
use tinyagi_queue::{MessageEnvelope, Spooler};
use tinyagi_repository::Repository;

use crate::error::Result;
use crate::state::ProactiveState;

fn target_key(channel: &str, sender_id: Option<&str>) -> String {
    format!("{channel}|{}", sender_id.unwrap_or(""))
}

/// Run one digest pass for `today` (a `YYYY-MM-DD` UTC date) and
/// `since_millis` (the lookback window for target enumeration). Returns the
/// number of envelopes enqueued.
#[allow(clippy::too_many_arguments)]
pub fn run_daily_digest(
    repo: &Repository,
    memory_raw_dir: &Path,
    memory_daily_dir: &Path,
    spooler: &Spooler,
    state: &mut ProactiveState,
    state_path: &Path,
    today: &str,
    since_millis: i64,
    now_millis: i64,
) -> Result<usize> {
    let targets = repo.list_distinct_senders_since(since_millis)?;
    let pending: Vec<_> = targets
        .into_iter()
        .filter(|(channel, sender_id)| !state.already_digested(today, &target_key(channel, sender_id.as_deref())))
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let summary_path = generate_daily_summary(repo, memory_raw_dir, memory_daily_dir, today)?;
    let summary_text = std::fs::read_to_string(&summary_path)?;

    let mut enqueued = 0;
    for (channel, sender_id) in &pending {
        let envelope = MessageEnvelope {
            channel: channel.clone(),
            sender: sender_id.clone().unwrap_or_default(),
            sender_id: sender_id.clone(),
            message: summary_text.clone(),
            timestamp: now_millis,
            message_id: format!("digest-{today}-{channel}-{}", sender_id.as_deref().unwrap_or("unknown")),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: None,
        };
        spooler.write_outgoing(&envelope)?;
        state.mark_digested(today, &target_key(channel, sender_id.as_deref()));
        enqueued += 1;
    }
    state.save(state_path)?;
    Ok(enqueued)
}
