use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Escrow,
    Milestone,
    Final,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Escrow => "escrow",
            PaymentType::Milestone => "milestone",
            PaymentType::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "escrow" => Some(PaymentType::Escrow),
            "milestone" => Some(PaymentType::Milestone),
            "final" => Some(PaymentType::Final),
            _ => None,
        }
    }
}

// 金额一律以最小货币单位（分）入库；审计需要，支付行只增不删
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub gig_id: Option<String>,
    pub client_id: String,
    pub creative_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub processor_intent_id: Option<String>,
    pub processor_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub gig_id: Option<String>,
    pub client_id: String,
    pub creative_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub processor_intent_id: Option<String>,
    pub processor_customer_id: Option<String>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, new: NewPayment) -> Result<Payment, AppError>;
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, AppError>;
    async fn get_payment_by_intent(&self, intent_id: &str)
        -> Result<Option<Payment>, AppError>;
    async fn list_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, AppError>;
    async fn set_payment_status(&self, id: &str, status: PaymentStatus)
        -> Result<bool, AppError>;
}

// 本地用户 ↔ 支付方 customer 映射；invoice 类 webhook 靠它定位用户
#[derive(Debug, Clone)]
pub struct CustomerMapping {
    pub user_id: String,
    pub processor_customer_id: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn upsert_customer(
        &self,
        user_id: &str,
        processor_customer_id: &str,
    ) -> Result<CustomerMapping, AppError>;
    async fn get_user_by_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<String>, AppError>;
    async fn get_customer_for_user(&self, user_id: &str) -> Result<Option<String>, AppError>;
}
