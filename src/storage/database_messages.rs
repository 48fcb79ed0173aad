use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::messaging::{ConversationSummary, Message, MessageStore, SendMessagePayload};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, to_iso8601};

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<(Message, String)> {
    Ok((
        Message {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            recipient_id: row.get(2)?,
            gig_id: row.get(3)?,
            body: row.get(4)?,
            read: row.get::<_, i64>(5)? != 0,
            created_at: Utc::now(),
        },
        row.get(6)?,
    ))
}

fn finish_message(parts: (Message, String)) -> Result<Message, AppError> {
    let (mut msg, created_raw) = parts;
    msg.created_at = parse_iso8601(&created_raw)?;
    Ok(msg)
}

#[async_trait]
impl MessageStore for Database {
    async fn create_message(
        &self,
        sender_id: &str,
        payload: SendMessagePayload,
    ) -> Result<Message, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO messages (id, sender_id, recipient_id, gig_id, body, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            (
                &id,
                sender_id,
                &payload.recipient_id,
                &payload.gig_id,
                &payload.body,
                to_iso8601(&now),
            ),
        )?;

        Ok(Message {
            id,
            sender_id: sender_id.to_string(),
            recipient_id: payload.recipient_id,
            gig_id: payload.gig_id,
            body: payload.body,
            read: false,
            created_at: now,
        })
    }

    async fn list_conversation(
        &self,
        user_id: &str,
        peer_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, recipient_id, gig_id, body, is_read, created_at
             FROM messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([user_id, peer_id], message_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_message(row?)?);
        }
        Ok(out)
    }

    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let conn = self.connection.lock().await;
        // 对端 = 与我有任一方向消息的用户；按最近一条消息排序
        let mut stmt = conn.prepare(
            "SELECT peer_id,
                    (SELECT body FROM messages m2
                      WHERE (m2.sender_id = ?1 AND m2.recipient_id = peer_id)
                         OR (m2.sender_id = peer_id AND m2.recipient_id = ?1)
                      ORDER BY m2.created_at DESC LIMIT 1) AS last_body,
                    (SELECT created_at FROM messages m3
                      WHERE (m3.sender_id = ?1 AND m3.recipient_id = peer_id)
                         OR (m3.sender_id = peer_id AND m3.recipient_id = ?1)
                      ORDER BY m3.created_at DESC LIMIT 1) AS last_at,
                    (SELECT COUNT(*) FROM messages m4
                      WHERE m4.sender_id = peer_id AND m4.recipient_id = ?1
                        AND m4.is_read = 0) AS unread
             FROM (
                 SELECT CASE WHEN sender_id = ?1 THEN recipient_id ELSE sender_id END AS peer_id
                 FROM messages
                 WHERE sender_id = ?1 OR recipient_id = ?1
                 GROUP BY peer_id
             )
             ORDER BY last_at DESC",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (peer_id, last_message, last_at_raw, unread_count) = row?;
            out.push(ConversationSummary {
                peer_id,
                last_message,
                last_message_at: parse_iso8601(&last_at_raw)?,
                unread_count,
            });
        }
        Ok(out)
    }

    async fn mark_read(&self, user_id: &str, peer_id: &str) -> Result<u64, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
            [user_id, peer_id],
        )?;
        Ok(affected as u64)
    }
}
