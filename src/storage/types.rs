use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

// 统一的请求类型常量（审计日志用，可扩展）
pub const REQ_TYPE_AUTH_REGISTER: &str = "auth_register";
pub const REQ_TYPE_AUTH_LOGIN: &str = "auth_login";
pub const REQ_TYPE_GIG_CREATE: &str = "gig_create";
pub const REQ_TYPE_GIG_UPDATE: &str = "gig_update";
pub const REQ_TYPE_GIG_DELETE: &str = "gig_delete";
pub const REQ_TYPE_GIG_FEATURE: &str = "gig_feature";
pub const REQ_TYPE_APPLICATION_CREATE: &str = "application_create";
pub const REQ_TYPE_APPLICATION_STATUS: &str = "application_status";
pub const REQ_TYPE_MESSAGE_SEND: &str = "message_send";
pub const REQ_TYPE_REVIEW_CREATE: &str = "review_create";
pub const REQ_TYPE_PAYMENT_INTENT: &str = "payment_intent";
pub const REQ_TYPE_ESCROW_RELEASE: &str = "escrow_release";
pub const REQ_TYPE_ESCROW_DISPUTE: &str = "escrow_dispute";
pub const REQ_TYPE_MILESTONE_CREATE: &str = "milestone_create";
pub const REQ_TYPE_MILESTONE_PAY: &str = "milestone_pay";
pub const REQ_TYPE_SUBSCRIPTION_CHECKOUT: &str = "subscription_checkout";
pub const REQ_TYPE_WEBHOOK: &str = "webhook";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub request_type: String,
    pub user_id: Option<String>,
    pub status_code: u16,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn log_request(&self, log: RequestLog) -> Result<i64, AppError>;
    async fn get_recent_logs(&self, limit: i64) -> Result<Vec<RequestLog>, AppError>;
}
