use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::messaging::{ConversationSummary, Message, MessageStore, SendMessagePayload};
use crate::storage::postgres_store::{PgStore, pg_row_bool_or, pg_row_opt_string};

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get(0),
        sender_id: row.get(1),
        recipient_id: row.get(2),
        gig_id: pg_row_opt_string(row, 3),
        body: row.get(4),
        read: pg_row_bool_or(row, 5, false),
        created_at: row.get(6),
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create_message(
        &self,
        sender_id: &str,
        payload: SendMessagePayload,
    ) -> Result<Message, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO messages (id, sender_id, recipient_id, gig_id, body, is_read, created_at)
                 VALUES ($1, $2, $3, $4, $5, FALSE, $6)",
                &[
                    &id,
                    &sender_id,
                    &payload.recipient_id,
                    &payload.gig_id,
                    &payload.body,
                    &now,
                ],
            )
            .await?;

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
        let client = self.pool.pick();
        let rows = client
            .query(
                "SELECT id, sender_id, recipient_id, gig_id, body, is_read, created_at
                 FROM messages
                 WHERE (sender_id = $1 AND recipient_id = $2)
                    OR (sender_id = $2 AND recipient_id = $1)
                 ORDER BY created_at ASC",
                &[&user_id, &peer_id],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                "SELECT peers.peer_id,
                        (SELECT body FROM messages m2
                          WHERE (m2.sender_id = $1 AND m2.recipient_id = peers.peer_id)
                             OR (m2.sender_id = peers.peer_id AND m2.recipient_id = $1)
                          ORDER BY m2.created_at DESC LIMIT 1) AS last_body,
                        (SELECT created_at FROM messages m3
                          WHERE (m3.sender_id = $1 AND m3.recipient_id = peers.peer_id)
                             OR (m3.sender_id = peers.peer_id AND m3.recipient_id = $1)
                          ORDER BY m3.created_at DESC LIMIT 1) AS last_at,
                        (SELECT COUNT(*) FROM messages m4
                          WHERE m4.sender_id = peers.peer_id AND m4.recipient_id = $1
                            AND m4.is_read = FALSE) AS unread
                 FROM (
                     SELECT CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END AS peer_id
                     FROM messages
                     WHERE sender_id = $1 OR recipient_id = $1
                     GROUP BY peer_id
                 ) peers
                 ORDER BY last_at DESC",
                &[&user_id],
            )
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ConversationSummary {
                peer_id: row.get(0),
                last_message: row.get(1),
                last_message_at: row.get(2),
                unread_count: row.get(3),
            });
        }
        Ok(out)
    }

    async fn mark_read(&self, user_id: &str, peer_id: &str) -> Result<u64, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE messages SET is_read = TRUE
                 WHERE recipient_id = $1 AND sender_id = $2 AND is_read = FALSE",
                &[&user_id, &peer_id],
            )
            .await?;
        Ok(affected)
    }
}
