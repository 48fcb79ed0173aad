use std::time::Duration;

use async_trait::async_trait;

use super::{
    CheckoutSession, CheckoutSessionParams, CreateIntentParams, PaymentIntent, PaymentProcessor,
};
use crate::error::AppError;

// Stripe 形态的 REST API：Bearer 密钥 + form 编码请求体。
// 上游任何失败统一折叠为固定的 500 文案，不向客户端透出细节。
pub struct HttpProcessorClient {
    base_url: String,
    secret_key: String,
    client: reqwest::Client,
}

impl HttpProcessorClient {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl PaymentProcessor for HttpProcessorClient {
    async fn create_payment_intent(
        &self,
        params: CreateIntentParams,
    ) -> Result<PaymentIntent, AppError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let form = [
            ("amount", params.amount.to_string()),
            ("currency", params.currency.clone()),
            ("metadata[userId]", params.metadata.user_id.clone()),
            ("metadata[gigId]", params.metadata.gig_id.clone()),
            ("metadata[paymentType]", params.metadata.payment_type.clone()),
        ];

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("payment intent request failed: {}", e);
                AppError::Upstream
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("payment intent creation rejected: {} {}", status, body);
            return Err(AppError::Upstream);
        }

        resp.json::<PaymentIntent>().await.map_err(|e| {
            tracing::error!("payment intent response parse failed: {}", e);
            AppError::Upstream
        })
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, AppError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", params.plan_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[userId]", params.user_id.clone()),
            ("subscription_data[metadata][userId]", params.user_id.clone()),
        ];
        if let Some(customer) = &params.customer_id {
            form.push(("customer", customer.clone()));
        }

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("checkout session request failed: {}", e);
                AppError::Upstream
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("checkout session creation rejected: {} {}", status, body);
            return Err(AppError::Upstream);
        }

        resp.json::<CheckoutSession>().await.map_err(|e| {
            tracing::error!("checkout session response parse failed: {}", e);
            AppError::Upstream
        })
    }
}
