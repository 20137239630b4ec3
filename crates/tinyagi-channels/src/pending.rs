// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tinyagi_repository::{ChannelPendingMessage, Repository};

/// Parameters for [`PendingStore::remember`].
pub struct RememberArgs<'a> {
    pub message_id: &'a str,
    pub channel: &'a str,
    pub sender: &'a str,
    pub sender_id: Option<&'a str>,
    pub chat_ref: &'a str,
    pub reply_ref: Option<&'a str>,
    pub ttl_ms: i64,
}

/// Durable hand-off so a channel adapter can reply correctly after a
/// process restart even though its in-memory message-handle map is gone
/// (spec §3 `ChannelPendingMessage`, scenario S7).
#[derive(Clone)]
pub struct PendingStore {
    repo: Arc<Repository>,
}

impl PendingStore {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub fn remember(&self, args: RememberArgs<'_>) -> anyhow::Result<()> {
        self.repo.remember_pending_message(
            args.message_id,
            args.channel,
            args.sender,
            args.sender_id,
            args.chat_ref,
            args.reply_ref,
            args.ttl_ms,
        )?;
        Ok(())
    }

    pub fn read(&self, channel: &str, message_id: &str) -> anyhow::Result<Option<ChannelPendingMessage>> {
        Ok(self.repo.read_pending_message(channel, message_id)?)
    }

    pub fn clear(&self, message_id: &str) -> anyhow::Result<()> {
        self.repo.clear_pending_message(message_id)?;
        Ok(())
    }

    /// Idempotent; should be called on a timer independent of reads.
    pub fn cleanup_expired(&self) -> anyhow::Result<usize> {
        Ok(self.repo.purge_expired_pending_messages()?)
    }
}
