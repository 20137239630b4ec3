// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent team coordination: `@agent`/`@team` routing, teammate handoff
//! parsing, conversation aggregation, and the Markdown chat transcript.
pub mod conversation;
pub mod router;
pub mod transcript;

pub use conversation::{BranchResponse, Conversation, MAX_MESSAGES};
pub use router::{extract_teammate_mentions, find_team_for_agent, parse_route, RouteTarget, TeammateMention};
pub use transcript::append_chat_entry;
