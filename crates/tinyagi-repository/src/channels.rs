// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::model::ChannelPendingMessage;
use crate::{now_millis, Repository, Result};

/// Default TTL for a durable pending-message handle (spec §3: 10 min).
pub const DEFAULT_TTL_MILLIS: i64 = 10 * 60 * 1000;

impl Repository {
    pub fn remember_pending_message(
        &self,
        message_id: &str,
        channel: &str,
        sender: &str,
        sender_id: Option<&str>,
        chat_ref: &str,
        reply_ref: Option<&str>,
        ttl_millis: i64,
    ) -> Result<()> {
        let now = now_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO channel_pending_messages
                (message_id, channel, sender, sender_id, chat_ref, reply_ref, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(message_id) DO UPDATE SET
                channel = excluded.channel, sender = excluded.sender, sender_id = excluded.sender_id,
                chat_ref = excluded.chat_ref, reply_ref = excluded.reply_ref, expires_at = excluded.expires_at",
            rusqlite::params![message_id, channel, sender, sender_id, chat_ref, reply_ref, now + ttl_millis, now],
        )?;
        Ok(())
    }

    /// Returns `None` both when absent and when expired — expired rows are
    /// never surfaced by `read` even before a cleanup pass removes them.
    pub fn read_pending_message(&self, channel: &str, message_id: &str) -> Result<Option<ChannelPendingMessage>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<ChannelPendingMessage> = conn
            .query_row(
                "SELECT message_id, channel, sender, sender_id, chat_ref, reply_ref, expires_at, created_at
                 FROM channel_pending_messages WHERE channel = ?1 AND message_id = ?2",
                rusqlite::params![channel, message_id],
                row_to_pending,
            )
            .ok();
        Ok(row.filter(|r| r.expires_at >= now_millis()))
    }

    pub fn clear_pending_message(&self, message_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM channel_pending_messages WHERE message_id = ?1",
            rusqlite::params![message_id],
        )?;
        Ok(())
    }

    /// Idempotent cleanup: purge every row whose TTL has elapsed.
    pub fn purge_expired_pending_messages(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM channel_pending_messages WHERE expires_at < ?1",
            rusqlite::params![now_millis()],
        )?;
        Ok(n)
    }
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelPendingMessage> {
    Ok(ChannelPendingMessage {
        message_id: row.get(0)?,
        channel: row.get(1)?,
        sender: row.get(2)?,
        sender_id: row.get(3)?,
        chat_ref: row.get(4)?,
        reply_ref: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_then_read_then_clear() {
        let repo = Repository::open_in_memory().unwrap();
        repo.remember_pending_message("m", "whatsapp", "t", Some("123"), "123@c.us", Some("abc"), 60_000).unwrap();
        assert!(repo.read_pending_message("whatsapp", "m").unwrap().is_some());
        repo.clear_pending_message("m").unwrap();
        assert!(repo.read_pending_message("whatsapp", "m").unwrap().is_none());
    }

    #[test]
    fn expired_row_is_not_returned_by_read() {
        let repo = Repository::open_in_memory().unwrap();
        repo.remember_pending_message("m", "whatsapp", "t", Some("123"), "123@c.us", None, -1).unwrap();
        assert!(repo.read_pending_message("whatsapp", "m").unwrap().is_none());
    }

    #[test]
    fn purge_expired_is_idempotent() {
        let repo = Repository::open_in_memory().unwrap();
        repo.remember_pending_message("m", "whatsapp", "t", Some("123"), "123@c.us", None, -1).unwrap();
        assert_eq!(repo.purge_expired_pending_messages().unwrap(), 1);
        assert_eq!(repo.purge_expired_pending_messages().unwrap(), 0);
    }
}
