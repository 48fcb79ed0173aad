use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::auth::{AccessTokenClaims, ensure_access_token};
use crate::applications::ApplicationStatus;
use crate::error::{AppError, Result as AppResult};
use crate::escrow::{Escrow, EscrowStatus};
use crate::payments::{NewPayment, Payment, PaymentStatus, PaymentType};
use crate::processor::{CreateIntentParams, IntentMetadata};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::{
    REQ_TYPE_ESCROW_DISPUTE, REQ_TYPE_ESCROW_RELEASE, REQ_TYPE_PAYMENT_INTENT,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub gig_id: String,
    // 主货币单位（如美元）；发给支付方前转为最小单位（分）
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub payment_id: String,
    pub intent_id: String,
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_id: Option<String>,
}

pub async fn create_intent(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateIntentRequest>,
) -> AppResult<Json<IntentResponse>> {
    let start = Utc::now();
    // 认证先于一切校验与上游调用
    let claims = ensure_access_token(&headers)?;
    let result = create_intent_inner(&app_state, &claims, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/payments/intent",
        REQ_TYPE_PAYMENT_INTENT,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn create_intent_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    payload: CreateIntentRequest,
) -> AppResult<IntentResponse> {
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    let Some(currency) = payload.currency.filter(|c| !c.trim().is_empty()) else {
        return Err(AppError::Validation("currency is required".into()));
    };
    let payment_type = match payload.payment_type.as_deref() {
        None => {
            return Err(AppError::Validation("paymentType is required".into()));
        }
        Some(raw) => match PaymentType::parse(raw) {
            Some(PaymentType::Milestone) => {
                return Err(AppError::Validation(
                    "milestone payments are created via the milestone pay endpoint".into(),
                ));
            }
            Some(t) => t,
            None => {
                return Err(AppError::Validation(format!(
                    "unknown payment type `{}`",
                    raw
                )));
            }
        },
    };

    let Some(gig) = app_state.gigs.get_gig(&payload.gig_id).await? else {
        return Err(AppError::Validation("gig not found".into()));
    };
    if gig.client_id != claims.sub {
        return Err(AppError::Forbidden("only the gig client can pay".into()));
    }

    let amount_minor = (payload.amount * 100.0).round() as i64;

    let intent = app_state
        .processor
        .create_payment_intent(CreateIntentParams {
            amount: amount_minor,
            currency: currency.clone(),
            metadata: IntentMetadata {
                user_id: claims.sub.clone(),
                gig_id: gig.id.clone(),
                payment_type: payment_type.as_str().to_string(),
            },
        })
        .await?;

    let creative_id = app_state
        .applications
        .list_applications_for_gig(&gig.id)
        .await?
        .into_iter()
        .find(|a| a.status == ApplicationStatus::Accepted)
        .map(|a| a.creative_id);

    let payment = app_state
        .payments
        .create_payment(NewPayment {
            gig_id: Some(gig.id.clone()),
            client_id: claims.sub.clone(),
            creative_id,
            amount: amount_minor,
            currency,
            status: PaymentStatus::Pending,
            payment_type,
            processor_intent_id: Some(intent.id.clone()),
            processor_customer_id: None,
        })
        .await?;

    let escrow_id = if payment_type == PaymentType::Escrow {
        let escrow = app_state.escrows.create_escrow(&payment.id).await?;
        Some(escrow.id)
    } else {
        None
    };

    Ok(IntentResponse {
        payment_id: payment.id,
        intent_id: intent.id,
        client_secret: intent.client_secret,
        escrow_id,
    })
}

pub async fn my_payments(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Payment>>> {
    let claims = ensure_access_token(&headers)?;
    let payments = app_state.payments.list_payments_for_user(&claims.sub).await?;
    Ok(Json(payments))
}

async fn escrow_with_payment(
    app_state: &AppState,
    escrow_id: &str,
) -> AppResult<(Escrow, Payment)> {
    let Some(escrow) = app_state.escrows.get_escrow(escrow_id).await? else {
        return Err(AppError::NotFound("escrow not found".into()));
    };
    let Some(payment) = app_state.payments.get_payment(&escrow.payment_id).await? else {
        return Err(AppError::NotFound("payment not found".into()));
    };
    Ok((escrow, payment))
}

pub async fn release_escrow(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Escrow>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = release_escrow_inner(&app_state, &claims, &id).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/escrow/{}/release", id),
        REQ_TYPE_ESCROW_RELEASE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn release_escrow_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
) -> AppResult<Escrow> {
    let (escrow, payment) = escrow_with_payment(app_state, id).await?;
    // 只有付款客户可以放款
    if payment.client_id != claims.sub {
        return Err(AppError::Forbidden("only the paying client can release".into()));
    }
    // 路由只放行 funded→released；disputed 的裁决走人工流程
    if escrow.status != EscrowStatus::Funded {
        return Err(AppError::Validation(format!(
            "cannot release escrow in status {}",
            escrow.status.as_str()
        )));
    }

    app_state
        .escrows
        .set_escrow_status(&escrow.id, EscrowStatus::Released, Some(Utc::now()), None)
        .await?;
    app_state
        .escrows
        .get_escrow(&escrow.id)
        .await?
        .ok_or_else(|| AppError::NotFound("escrow not found".into()))
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

pub async fn dispute_escrow(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<DisputeRequest>,
) -> AppResult<Json<Escrow>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = dispute_escrow_inner(&app_state, &claims, &id, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/escrow/{}/dispute", id),
        REQ_TYPE_ESCROW_DISPUTE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn dispute_escrow_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
    payload: DisputeRequest,
) -> AppResult<Escrow> {
    if payload.reason.trim().is_empty() {
        return Err(AppError::Validation("dispute reason is required".into()));
    }

    let (escrow, payment) = escrow_with_payment(app_state, id).await?;
    // 只有收款创作者可以发起争议
    if payment.creative_id.as_deref() != Some(claims.sub.as_str()) {
        return Err(AppError::Forbidden(
            "only the receiving creative can dispute".into(),
        ));
    }
    if !escrow.status.can_transition(EscrowStatus::Disputed) {
        return Err(AppError::Validation(format!(
            "cannot dispute escrow in status {}",
            escrow.status.as_str()
        )));
    }

    app_state
        .escrows
        .set_escrow_status(&escrow.id, EscrowStatus::Disputed, None, Some(payload.reason))
        .await?;
    app_state
        .escrows
        .get_escrow(&escrow.id)
        .await?
        .ok_or_else(|| AppError::NotFound("escrow not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gigs::CreateGigPayload;
    use crate::server::handlers::auth::{AccessTokenClaims, issue_access_token};
    use crate::server::test_support::{RecordingProcessor, router_for, state_with_processor};
    use crate::users::{CreateUserPayload, User, UserRole};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::AUTHORIZATION};
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn make_user(state: &AppState, email: &str, role: UserRole) -> User {
        state
            .users
            .create_user(CreateUserPayload {
                email: email.into(),
                password: "password123".into(),
                username: None,
                display_name: None,
                role,
            })
            .await
            .unwrap()
    }

    fn token_for(user: &User) -> String {
        issue_access_token(&AccessTokenClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            exp: Utc::now().timestamp() + 3600,
            iat: None,
        })
        .unwrap()
    }

    async fn make_gig(state: &AppState, client_id: &str) -> crate::gigs::Gig {
        state
            .gigs
            .create_gig(
                client_id,
                CreateGigPayload {
                    title: "Logo design".into(),
                    description: "needs a logo".into(),
                    category: "design".into(),
                    budget: 500.0,
                    currency: "usd".into(),
                    deadline: None,
                },
            )
            .await
            .unwrap()
    }

    fn intent_request(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/payments/intent")
            .header("content-type", "application/json");
        if let Some(t) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", t));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn auth_and_validation_precede_processor_call() {
        let dir = tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::new());
        let state = state_with_processor(&dir, processor.clone()).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let gig = make_gig(&state, &client.id).await;
        let token = token_for(&client);

        // 未认证：401，且完全不触达上游
        let resp = router_for(state.clone())
            .oneshot(intent_request(
                None,
                serde_json::json!({
                    "gigId": gig.id, "amount": 10.0,
                    "currency": "usd", "paymentType": "escrow"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(processor.intents.lock().unwrap().is_empty());

        // 金额非法：400，同样不触达上游
        for amount in [0.0, -5.0] {
            let resp = router_for(state.clone())
                .oneshot(intent_request(
                    Some(&token),
                    serde_json::json!({
                    "gigId": gig.id, "amount": amount,
                    "currency": "usd", "paymentType": "escrow"
                }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(processor.intents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_currency_or_payment_type_is_rejected_before_upstream() {
        let dir = tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::new());
        let state = state_with_processor(&dir, processor.clone()).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let gig = make_gig(&state, &client.id).await;
        let token = token_for(&client);

        // currency 与 paymentType 都是必填项，缺任一个都不触达上游
        let bodies = [
            serde_json::json!({ "gigId": gig.id, "amount": 10.0 }),
            serde_json::json!({ "gigId": gig.id, "amount": 10.0, "currency": "usd" }),
            serde_json::json!({ "gigId": gig.id, "amount": 10.0, "paymentType": "escrow" }),
            serde_json::json!({
                "gigId": gig.id, "amount": 10.0,
                "currency": " ", "paymentType": "escrow"
            }),
        ];
        for body in bodies {
            let resp = router_for(state.clone())
                .oneshot(intent_request(Some(&token), body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(processor.intents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn amount_is_converted_to_minor_units() {
        let dir = tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::new());
        let state = state_with_processor(&dir, processor.clone()).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let gig = make_gig(&state, &client.id).await;
        let token = token_for(&client);

        let resp = router_for(state.clone())
            .oneshot(intent_request(
                Some(&token),
                serde_json::json!({
                    "gigId": gig.id, "amount": 10.0,
                    "currency": "usd", "paymentType": "escrow"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;

        let recorded = processor.intents.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount, 1000);
        assert_eq!(recorded[0].metadata.user_id, client.id);
        assert_eq!(recorded[0].metadata.gig_id, gig.id);
        assert_eq!(recorded[0].metadata.payment_type, "escrow");
        drop(recorded);

        let payment_id = body["paymentId"].as_str().unwrap();
        let payment = state.payments.get_payment(payment_id).await.unwrap().unwrap();
        assert_eq!(payment.amount, 1000);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.payment_type, PaymentType::Escrow);

        // escrow 类型随支付创建托管行，初始 pending
        let escrow_id = body["escrowId"].as_str().unwrap();
        let escrow = state.escrows.get_escrow(escrow_id).await.unwrap().unwrap();
        assert_eq!(escrow.payment_id, payment.id);
        assert_eq!(escrow.status, EscrowStatus::Pending);
    }

    #[tokio::test]
    async fn fractional_amounts_round_to_nearest_cent() {
        let dir = tempdir().unwrap();
        let processor = Arc::new(RecordingProcessor::new());
        let state = state_with_processor(&dir, processor.clone()).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let gig = make_gig(&state, &client.id).await;
        let token = token_for(&client);

        let resp = router_for(state.clone())
            .oneshot(intent_request(
                Some(&token),
                serde_json::json!({
                    "gigId": gig.id, "amount": 19.995,
                    "currency": "usd", "paymentType": "escrow"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(processor.intents.lock().unwrap()[0].amount, 2000);
    }

    #[tokio::test]
    async fn processor_failure_is_a_fixed_500() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::failing())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let gig = make_gig(&state, &client.id).await;
        let token = token_for(&client);

        let resp = router_for(state.clone())
            .oneshot(intent_request(
                Some(&token),
                serde_json::json!({
                    "gigId": gig.id, "amount": 10.0,
                    "currency": "usd", "paymentType": "escrow"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "payment processing failed");

        // 上游失败时不落任何支付行
        let payments = state.payments.list_payments_for_user(&client.id).await.unwrap();
        assert!(payments.is_empty());
    }

    #[tokio::test]
    async fn only_the_client_releases_and_only_from_funded() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let creative = make_user(&state, "creative@example.com", UserRole::Creative).await;
        let gig = make_gig(&state, &client.id).await;

        let payment = state
            .payments
            .create_payment(NewPayment {
                gig_id: Some(gig.id.clone()),
                client_id: client.id.clone(),
                creative_id: Some(creative.id.clone()),
                amount: 1000,
                currency: "usd".into(),
                status: PaymentStatus::Pending,
                payment_type: PaymentType::Escrow,
                processor_intent_id: Some("pi_1".into()),
                processor_customer_id: None,
            })
            .await
            .unwrap();
        let escrow = state.escrows.create_escrow(&payment.id).await.unwrap();

        let release = |token: String, state| {
            let uri = format!("/escrow/{}/release", escrow.id);
            async move {
                router_for(state)
                    .oneshot(
                        Request::builder()
                            .method("POST")
                            .uri(uri)
                            .header(AUTHORIZATION, format!("Bearer {}", token))
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap()
            }
        };

        // pending 不能释放
        let resp = release(token_for(&client), state.clone()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        state
            .escrows
            .set_escrow_status(&escrow.id, EscrowStatus::Funded, None, None)
            .await
            .unwrap();

        // 创作者无权释放
        let resp = release(token_for(&creative), state.clone()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = release(token_for(&client), state.clone()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "released");
        assert!(body["releaseDate"].is_string());

        // released 是终态
        let resp = release(token_for(&client), state.clone()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_the_creative_disputes_a_funded_escrow() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let creative = make_user(&state, "creative@example.com", UserRole::Creative).await;
        let outsider = make_user(&state, "other@example.com", UserRole::Creative).await;
        let gig = make_gig(&state, &client.id).await;

        let payment = state
            .payments
            .create_payment(NewPayment {
                gig_id: Some(gig.id.clone()),
                client_id: client.id.clone(),
                creative_id: Some(creative.id.clone()),
                amount: 1000,
                currency: "usd".into(),
                status: PaymentStatus::Completed,
                payment_type: PaymentType::Escrow,
                processor_intent_id: Some("pi_1".into()),
                processor_customer_id: None,
            })
            .await
            .unwrap();
        let escrow = state.escrows.create_escrow(&payment.id).await.unwrap();
        state
            .escrows
            .set_escrow_status(&escrow.id, EscrowStatus::Funded, None, None)
            .await
            .unwrap();

        let dispute = |token: String, state, reason: &str| {
            let uri = format!("/escrow/{}/dispute", escrow.id);
            let body = serde_json::json!({ "reason": reason }).to_string();
            async move {
                router_for(state)
                    .oneshot(
                        Request::builder()
                            .method("POST")
                            .uri(uri)
                            .header("content-type", "application/json")
                            .header(AUTHORIZATION, format!("Bearer {}", token))
                            .body(Body::from(body))
                            .unwrap(),
                    )
                    .await
                    .unwrap()
            }
        };

        let resp = dispute(token_for(&outsider), state.clone(), "not mine").await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // 付款客户也无权发起争议
        let resp = dispute(token_for(&client), state.clone(), "bad work").await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = dispute(token_for(&creative), state.clone(), "").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = dispute(token_for(&creative), state.clone(), "scope creep").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "disputed");
        assert_eq!(body["disputeReason"], "scope creep");

        // 已争议不可再争议；裁决走人工流程
        let resp = dispute(token_for(&creative), state.clone(), "again").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
