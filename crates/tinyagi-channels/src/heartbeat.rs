// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tinyagi_queue::MessageEnvelope;
use uuid::Uuid;

/// The heartbeat pseudo-channel: a synthetic channel used by the proactive
/// scheduler for liveness pings. Its envelopes use `channel == "heartbeat"`,
/// which the spooler's filename scheme shortens to `<msgId>.json` (spec §6).
pub fn tick(now_millis: i64) -> MessageEnvelope {
    MessageEnvelope {
        channel: "heartbeat".into(),
        sender: "system".into(),
        sender_id: None,
        message: "ping".into(),
        timestamp: now_millis,
        message_id: format!("hb_{}", Uuid::new_v4()),
        agent: None,
        files: None,
        conversation_id: None,
        from_agent: None,
        original_message: None,
    }
}
