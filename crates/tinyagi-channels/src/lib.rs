// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Ambient channel contracts: the message envelope (re-exported from
//! `tinyagi-queue`), the durable pending-message store, and the heartbeat
//! pseudo-channel. Real adapters for specific messaging networks
//! (WhatsApp, Telegram, Discord, Signal, Matrix, IRC) are external
//! collaborators; only their queue/pending contract lives here.
pub mod heartbeat;
pub mod pending;

pub use pending::{PendingStore, RememberArgs};
pub use tinyagi_queue::MessageEnvelope;
