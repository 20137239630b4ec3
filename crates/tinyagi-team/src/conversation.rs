// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::Utc;

/// Hard cap on messages within one conversation (spec §3: `maxMessages`,
/// fixed at 50).
pub const MAX_MESSAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct BranchResponse {
    pub agent_id: String,
    pub response: String,
}

/// Live aggregation state for a team conversation, keyed externally by
/// `conversationId` (spec §3 `Conversation`). Lost on restart by design —
/// open external messages are superseded by new inbound traffic instead of
/// being reconstructed (spec §9 design note).
#[derive(Debug, Clone)]
pub struct Conversation {
    pub team_id: String,
    pub channel: String,
    pub sender: String,
    pub sender_id: Option<String>,
    pub original_message: String,
    pub branches: Vec<BranchResponse>,
    pub attachment_paths: Vec<String>,
    pub pending: u32,
    pub total_messages: u32,
    pub max_messages: u32,
    pub started_at_millis: i64,
    pub outgoing_mention_counts: HashMap<String, u32>,
}

impl Conversation {
    pub fn new(team_id: impl Into<String>, channel: impl Into<String>, sender: impl Into<String>, sender_id: Option<String>, original_message: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            channel: channel.into(),
            sender: sender.into(),
            sender_id,
            original_message: original_message.into(),
            branches: Vec::new(),
            attachment_paths: Vec::new(),
            pending: 1,
            total_messages: 1,
            max_messages: MAX_MESSAGES,
            started_at_millis: Utc::now().timestamp_millis(),
            outgoing_mention_counts: HashMap::new(),
        }
    }

    /// Append a branch's response and close out that branch.
    ///
    /// # Panics
    /// Debug builds assert `pending > 0` before decrementing, matching the
    /// spec's `pending >= 0` invariant — callers must not call this more
    /// times than branches were opened.
    pub fn record_branch_response(&mut self, agent_id: impl Into<String>, response: impl Into<String>) {
        debug_assert!(self.pending > 0, "conversation pending went negative");
        self.branches.push(BranchResponse { agent_id: agent_id.into(), response: response.into() });
        self.pending = self.pending.saturating_sub(1);
    }

    /// True when a teammate mention may still be enqueued without tripping
    /// `maxMessages` (spec §3: dropped with a warning once reached, but
    /// existing branches still resolve).
    pub fn can_enqueue_mention(&self) -> bool {
        self.total_messages < self.max_messages
    }

    pub fn record_mention_enqueued(&mut self, target_agent: &str) {
        self.pending += 1;
        self.total_messages += 1;
        *self.outgoing_mention_counts.entry(target_agent.to_string()).or_insert(0) += 1;
    }

    pub fn is_closed(&self) -> bool {
        self.pending == 0
    }

    /// Single branch returns its raw text; multiple branches are joined as
    /// `@<agent>: <response>` segments separated by `------` (spec 4.N step 9).
    pub fn aggregate(&self) -> String {
        match self.branches.as_slice() {
            [] => String::new(),
            [only] => only.response.clone(),
            many => many
                .iter()
                .map(|b| format!("@{}: {}", b.agent_id, b.response))
                .collect::<Vec<_>>()
                .join("\n------\n"),
        }
    }
}
