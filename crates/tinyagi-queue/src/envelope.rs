// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The on-disk queue file shape (spec §3, §6). Required fields are plain;
/// everything else is optional so heartbeat/internal/adapter envelopes can
/// all round-trip through the same type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub channel: String,
    pub sender: String,
    #[serde(rename = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub message: String,
    pub timestamp: i64,
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Pre-routed agentId, bypassing `@agent`/`@team` parsing.
    #[serde(rename = "agent", skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Set only on internal (team re-enqueue) envelopes.
    #[serde(rename = "fromAgent", skip_serializing_if = "Option::is_none")]
    pub from_agent: Option<String>,
    /// Outgoing-only: the text that triggered this reply.
    #[serde(rename = "originalMessage", skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
}

impl MessageEnvelope {
    pub fn is_internal(&self) -> bool {
        self.conversation_id.is_some()
    }

    pub fn is_heartbeat(&self) -> bool {
        self.channel == "heartbeat"
    }
}
