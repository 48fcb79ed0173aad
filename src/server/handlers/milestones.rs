use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;
use serde::Serialize;

use super::auth::{AccessTokenClaims, ensure_access_token};
use crate::applications::ApplicationStatus;
use crate::error::{AppError, Result as AppResult};
use crate::milestones::{CreateMilestonePayload, Milestone, MilestoneStatus};
use crate::payments::{NewPayment, PaymentStatus, PaymentType};
use crate::processor::{CreateIntentParams, IntentMetadata};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::{REQ_TYPE_MILESTONE_CREATE, REQ_TYPE_MILESTONE_PAY};

pub async fn create_milestone(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(gig_id): Path<String>,
    Json(payload): Json<CreateMilestonePayload>,
) -> AppResult<Json<Milestone>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = create_milestone_inner(&app_state, &claims, &gig_id, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/gigs/{}/milestones", gig_id),
        REQ_TYPE_MILESTONE_CREATE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn create_milestone_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    gig_id: &str,
    payload: CreateMilestonePayload,
) -> AppResult<Milestone> {
    let Some(gig) = app_state.gigs.get_gig(gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.client_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden("not your gig".into()));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    app_state.milestones.create_milestone(gig_id, payload).await
}

pub async fn list_milestones(
    State(app_state): State<Arc<AppState>>,
    Path(gig_id): Path<String>,
) -> AppResult<Json<Vec<Milestone>>> {
    if app_state.gigs.get_gig(&gig_id).await?.is_none() {
        return Err(AppError::NotFound("gig not found".into()));
    }
    let milestones = app_state.milestones.list_milestones_for_gig(&gig_id).await?;
    Ok(Json(milestones))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePayResponse {
    pub milestone: Milestone,
    pub payment_id: String,
    pub intent_id: String,
    pub client_secret: String,
}

pub async fn pay_milestone(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<MilestonePayResponse>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = pay_milestone_inner(&app_state, &claims, &id).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/milestones/{}/pay", id),
        REQ_TYPE_MILESTONE_PAY,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn pay_milestone_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
) -> AppResult<MilestonePayResponse> {
    let Some(milestone) = app_state.milestones.get_milestone(id).await? else {
        return Err(AppError::NotFound("milestone not found".into()));
    };
    let Some(gig) = app_state.gigs.get_gig(&milestone.gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.client_id != claims.sub {
        return Err(AppError::Forbidden("only the gig client can pay".into()));
    }
    if !milestone.status.can_transition(MilestoneStatus::Processing) {
        return Err(AppError::Validation(format!(
            "milestone is already {}",
            milestone.status.as_str()
        )));
    }

    let amount_minor = (milestone.amount * 100.0).round() as i64;
    let intent = app_state
        .processor
        .create_payment_intent(CreateIntentParams {
            amount: amount_minor,
            currency: gig.currency.clone(),
            metadata: IntentMetadata {
                user_id: claims.sub.clone(),
                gig_id: gig.id.clone(),
                payment_type: PaymentType::Milestone.as_str().to_string(),
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
            gig_id: Some(gig.id),
            client_id: claims.sub.clone(),
            creative_id,
            amount: amount_minor,
            currency: gig.currency,
            status: PaymentStatus::Pending,
            payment_type: PaymentType::Milestone,
            processor_intent_id: Some(intent.id.clone()),
            processor_customer_id: None,
        })
        .await?;

    app_state
        .milestones
        .set_milestone_status(id, MilestoneStatus::Processing, Some(payment.id.clone()))
        .await?;

    let milestone = app_state
        .milestones
        .get_milestone(id)
        .await?
        .ok_or_else(|| AppError::NotFound("milestone not found".into()))?;

    Ok(MilestonePayResponse {
        milestone,
        payment_id: payment.id,
        intent_id: intent.id,
        client_secret: intent.client_secret,
    })
}
