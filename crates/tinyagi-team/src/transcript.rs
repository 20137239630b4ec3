// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fs4::FileExt;

/// Append one conversation's aggregated result to `<chats_dir>/<utc-date>.md`,
/// holding an exclusive file lock for the duration of the write so
/// concurrent conversations closing around the same moment do not
/// interleave (spec §6 `chats/<teamId>/<utc-date>.md`).
pub fn append_chat_entry(chats_dir: &Path, utc_date: &str, sender: &str, original_message: &str, aggregated_response: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(chats_dir)?;
    let path = chats_dir.join(format!("{utc_date}.md"));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.lock_exclusive()?;
    let entry = format!(
        "## {sender}\n\n**Message:** {original_message}\n\n**Response:**\n\n{aggregated_response}\n\n---\n\n",
    );
    let result = file.write_all(entry.as_bytes());
    let _ = file.unlock();
    result?;
    Ok(())
}
