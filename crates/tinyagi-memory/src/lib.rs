// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Memory service: regex-driven ingest, confidence-ranked retrieval, and
//! daily summary generation (spec component J).
pub mod daily;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod raw;
pub mod retrieve;

pub use daily::generate_daily_summary;
pub use error::{MemoryError, Result};
pub use extract::{dedup_highest_confidence, extract_facts, Extracted};
pub use ingest::{ingest, stable_record_id};
pub use raw::{append_raw_event, read_raw_events_for_date, RawMemoryEvent};
pub use retrieve::{format_context_block, retrieve};
