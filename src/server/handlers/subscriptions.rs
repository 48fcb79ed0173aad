use std::sync::Arc;

use axum::extract::State;
use axum::{Json, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::auth::ensure_access_token;
use crate::error::{AppError, Result as AppResult};
use crate::processor::CheckoutSessionParams;
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::REQ_TYPE_SUBSCRIPTION_CHECKOUT;
use crate::subscription::Subscription;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MySubscriptionResponse {
    pub subscription: Option<Subscription>,
    pub premium: bool,
}

pub async fn my_subscription(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<MySubscriptionResponse>> {
    let claims = ensure_access_token(&headers)?;
    let subscription = app_state
        .subscriptions
        .get_subscription_for_user(&claims.sub)
        .await?;
    let premium = subscription
        .as_ref()
        .map(|s| s.status.grants_premium())
        .unwrap_or(false);
    Ok(Json(MySubscriptionResponse {
        subscription,
        premium,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

pub async fn checkout(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = checkout_inner(&app_state, &claims.sub, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/subscriptions/checkout",
        REQ_TYPE_SUBSCRIPTION_CHECKOUT,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn checkout_inner(
    app_state: &AppState,
    user_id: &str,
    payload: CheckoutRequest,
) -> AppResult<CheckoutResponse> {
    if payload.plan_id.trim().is_empty() {
        return Err(AppError::Validation("planId is required".into()));
    }

    let customer_id = app_state.customers.get_customer_for_user(user_id).await?;
    let session = app_state
        .processor
        .create_checkout_session(CheckoutSessionParams {
            user_id: user_id.to_string(),
            plan_id: payload.plan_id,
            customer_id,
        })
        .await?;

    Ok(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    })
}
