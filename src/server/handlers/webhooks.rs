use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::{Json, http::HeaderMap};
use chrono::Utc;

use crate::error::{AppError, Result as AppResult};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::REQ_TYPE_WEBHOOK;
use crate::webhook::{parse_event, verify_signature};

const SIGNATURE_HEADER: &str = "stripe-signature";

// 签名无效 → 400；签名有效但单个事件处理失败 → 记日志后仍回 200，
// 避免支付方无限重投。
pub async fn receive(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let start = Utc::now();
    let result = receive_inner(&app_state, &headers, &body).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/webhooks/payments",
        REQ_TYPE_WEBHOOK,
        None,
        &result,
    )
    .await;
    result.map(|_| Json(serde_json::json!({ "received": true })))
}

async fn receive_inner(
    app_state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> AppResult<()> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("missing signature header".into()))?;
    let payload = std::str::from_utf8(body)
        .map_err(|_| AppError::Validation("payload is not valid UTF-8".into()))?;

    verify_signature(payload, signature, &app_state.config.processor.webhook_secret())?;

    let envelope: serde_json::Value = serde_json::from_str(payload)
        .map_err(|_| AppError::Validation("payload is not valid JSON".into()))?;

    match parse_event(&envelope) {
        Ok(event) => {
            if let Err(e) = app_state.dispatcher().handle(event).await {
                tracing::error!("webhook event processing failed: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("webhook event parse failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::EscrowStatus;
    use crate::payments::{NewPayment, PaymentStatus, PaymentType};
    use crate::server::test_support::{RecordingProcessor, router_for, state_with_processor};
    use crate::subscription::SubscriptionStatus;
    use crate::users::{CreateUserPayload, UserRole};
    use crate::webhook::sign_payload;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn webhook_request(payload: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payments")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        builder.body(Body::from(payload.to_string())).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_invalid_signature() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let payload = r#"{"type":"charge.captured","data":{"object":{}}}"#;

        let resp = router_for(state.clone())
            .oneshot(webhook_request(payload, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router_for(state.clone())
            .oneshot(webhook_request(payload, Some("t=1,v1=deadbeef")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mirrors_subscription_state_from_signed_event() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let user = state
            .users
            .create_user(CreateUserPayload {
                email: "sub@example.com".into(),
                password: "password123".into(),
                username: None,
                display_name: None,
                role: UserRole::Creative,
            })
            .await
            .unwrap();

        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_abc",
                "status": "active",
                "cancel_at_period_end": false,
                "current_period_end": 1900000000,
                "metadata": { "userId": user.id },
                "plan": { "id": "plan_pro" }
            }}
        })
        .to_string();
        let secret = state.config.processor.webhook_secret();
        let signature = sign_payload(&payload, &secret, Utc::now().timestamp());

        let resp = router_for(state.clone())
            .oneshot(webhook_request(&payload, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let sub = state
            .subscriptions
            .get_subscription_for_user(&user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.plan_id, "plan_pro");
        assert!(sub.status.grants_premium());
    }

    #[tokio::test]
    async fn intent_succeeded_funds_the_escrow() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let payment = state
            .payments
            .create_payment(NewPayment {
                gig_id: None,
                client_id: "user-1".into(),
                creative_id: None,
                amount: 1000,
                currency: "usd".into(),
                status: PaymentStatus::Pending,
                payment_type: PaymentType::Escrow,
                processor_intent_id: Some("pi_webhook_1".into()),
                processor_customer_id: None,
            })
            .await
            .unwrap();
        let escrow = state.escrows.create_escrow(&payment.id).await.unwrap();

        let payload = serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_webhook_1" } }
        })
        .to_string();
        let secret = state.config.processor.webhook_secret();
        let signature = sign_payload(&payload, &secret, Utc::now().timestamp());

        let resp = router_for(state.clone())
            .oneshot(webhook_request(&payload, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let payment = state.payments.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        let escrow = state.escrows.get_escrow(&escrow.id).await.unwrap().unwrap();
        assert_eq!(escrow.status, EscrowStatus::Funded);
    }

    #[tokio::test]
    async fn checkout_completion_enables_invoice_reconciliation() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let user = state
            .users
            .create_user(CreateUserPayload {
                email: "payer@example.com".into(),
                password: "password123".into(),
                username: None,
                display_name: None,
                role: UserRole::Client,
            })
            .await
            .unwrap();
        let secret = state.config.processor.webhook_secret();

        // checkout 完成事件落下 user ↔ customer 映射
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "customer": "cus_99",
                "metadata": { "userId": user.id }
            }}
        })
        .to_string();
        let signature = sign_payload(&payload, &secret, Utc::now().timestamp());
        let resp = router_for(state.clone())
            .oneshot(webhook_request(&payload, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state
                .customers
                .get_user_by_customer("cus_99")
                .await
                .unwrap()
                .as_deref(),
            Some(user.id.as_str())
        );

        // 随后的发票事件能经由映射找回用户并落一条完成支付
        let payload = serde_json::json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": {
                "customer": "cus_99",
                "amount_paid": 1500,
                "currency": "usd"
            }}
        })
        .to_string();
        let signature = sign_payload(&payload, &secret, Utc::now().timestamp());
        let resp = router_for(state.clone())
            .oneshot(webhook_request(&payload, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let payments = state.payments.list_payments_for_user(&user.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, 1500);
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(payments[0].payment_type, PaymentType::Final);
        assert_eq!(payments[0].processor_customer_id.as_deref(), Some("cus_99"));
    }

    #[tokio::test]
    async fn event_failures_still_acknowledge_with_200() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;

        // 客户映射不存在，事件处理必然失败，但端点仍须确认
        let payload = serde_json::json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": { "customer": "cus_unknown", "amount_paid": 500 } }
        })
        .to_string();
        let secret = state.config.processor.webhook_secret();
        let signature = sign_payload(&payload, &secret, Utc::now().timestamp());

        let resp = router_for(state.clone())
            .oneshot(webhook_request(&payload, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["received"], true);
    }
}
