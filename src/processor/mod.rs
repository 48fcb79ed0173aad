pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use client::HttpProcessorClient;

// 创建充值意图的参数；amount 为最小货币单位（分）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentParams {
    pub amount: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    pub user_id: String,
    pub gig_id: String,
    pub payment_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    pub user_id: String,
    pub plan_id: String,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

// 对外支付方的最小接口；HTTP 实现见 client.rs，测试用记录型 mock
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        params: CreateIntentParams,
    ) -> Result<PaymentIntent, AppError>;

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, AppError>;
}
