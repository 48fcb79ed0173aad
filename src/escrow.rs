use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Pending,
    Funded,
    Released,
    Disputed,
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Released => "released",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EscrowStatus::Pending),
            "funded" => Some(EscrowStatus::Funded),
            "released" => Some(EscrowStatus::Released),
            "disputed" => Some(EscrowStatus::Disputed),
            "refunded" => Some(EscrowStatus::Refunded),
            _ => None,
        }
    }

    // 状态机：pending → funded → {released | disputed}；
    // disputed → {released | refunded} 由人工裁决，不走自动化路径
    pub fn can_transition(self, next: EscrowStatus) -> bool {
        use EscrowStatus::*;
        matches!(
            (self, next),
            (Pending, Funded)
                | (Funded, Released)
                | (Funded, Disputed)
                | (Disputed, Released)
                | (Disputed, Refunded)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Escrow {
    pub id: String,
    pub payment_id: String,
    pub status: EscrowStatus,
    pub release_date: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait EscrowStore: Send + Sync {
    // Payment(type=escrow) 与 Escrow 严格 1:1，随支付创建
    async fn create_escrow(&self, payment_id: &str) -> Result<Escrow, AppError>;
    async fn get_escrow(&self, id: &str) -> Result<Option<Escrow>, AppError>;
    async fn get_escrow_by_payment(&self, payment_id: &str) -> Result<Option<Escrow>, AppError>;
    async fn set_escrow_status(
        &self,
        id: &str,
        status: EscrowStatus,
        release_date: Option<DateTime<Utc>>,
        dispute_reason: Option<String>,
    ) -> Result<bool, AppError>;
}
