use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub gig_id: Option<String>,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// 会话摘要：按对端用户聚合，消费者收到变更通知后整体重拉（不做增量合并）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub peer_id: String,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub recipient_id: String,
    #[serde(default)]
    pub gig_id: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(
        &self,
        sender_id: &str,
        payload: SendMessagePayload,
    ) -> Result<Message, AppError>;
    async fn list_conversation(
        &self,
        user_id: &str,
        peer_id: &str,
    ) -> Result<Vec<Message>, AppError>;
    async fn list_conversations(&self, user_id: &str)
        -> Result<Vec<ConversationSummary>, AppError>;
    async fn mark_read(&self, user_id: &str, peer_id: &str) -> Result<u64, AppError>;
}
