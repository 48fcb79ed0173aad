use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;

use super::auth::{AccessTokenClaims, ensure_access_token};
use crate::error::{AppError, Result as AppResult};
use crate::gigs::GigStatus;
use crate::reviews::{CreateReviewPayload, Review};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::REQ_TYPE_REVIEW_CREATE;

pub async fn create_review(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateReviewPayload>,
) -> AppResult<Json<Review>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = create_review_inner(&app_state, &claims, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/reviews",
        REQ_TYPE_REVIEW_CREATE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn create_review_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    payload: CreateReviewPayload,
) -> AppResult<Review> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::Validation("rating must be between 1 and 5".into()));
    }
    if payload.reviewee_id == claims.sub {
        return Err(AppError::Validation("cannot review yourself".into()));
    }

    let Some(gig) = app_state.gigs.get_gig(&payload.gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.status != GigStatus::Completed {
        return Err(AppError::Validation(
            "reviews are only allowed on completed gigs".into(),
        ));
    }

    // 评价双方必须都是这单 gig 的参与者（客户或中标创作者）
    let accepted_creative = app_state
        .applications
        .list_applications_for_gig(&gig.id)
        .await?
        .into_iter()
        .find(|a| a.status == crate::applications::ApplicationStatus::Accepted)
        .map(|a| a.creative_id);
    let is_party = |user_id: &str| {
        user_id == gig.client_id || accepted_creative.as_deref() == Some(user_id)
    };
    if !is_party(&claims.sub) || !is_party(&payload.reviewee_id) {
        return Err(AppError::Forbidden(
            "only gig participants can exchange reviews".into(),
        ));
    }

    if app_state
        .reviews
        .get_review_for_gig(&payload.gig_id, &claims.sub)
        .await?
        .is_some()
    {
        return Err(AppError::Validation("already reviewed this gig".into()));
    }

    app_state.reviews.create_review(&claims.sub, payload).await
}

pub async fn list_for_user(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Review>>> {
    let reviews = app_state.reviews.list_reviews_for_user(&user_id).await?;
    Ok(Json(reviews))
}
