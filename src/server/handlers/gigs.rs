use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;
use serde::Deserialize;

use super::auth::{AccessTokenClaims, ensure_access_token};
use crate::error::{AppError, Result as AppResult};
use crate::gigs::{CreateGigPayload, Gig, GigFilter, GigStatus, UpdateGigPayload};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::{
    REQ_TYPE_GIG_CREATE, REQ_TYPE_GIG_DELETE, REQ_TYPE_GIG_FEATURE, REQ_TYPE_GIG_UPDATE,
};
use crate::users::UserRole;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GigQuery {
    pub category: Option<String>,
    pub min_budget: Option<f64>,
    pub max_budget: Option<f64>,
    pub q: Option<String>,
    pub status: Option<String>,
}

async fn owned_gig(app_state: &AppState, id: &str, claims: &AccessTokenClaims) -> AppResult<Gig> {
    let Some(gig) = app_state.gigs.get_gig(id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.client_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden("not your gig".into()));
    }
    Ok(gig)
}

pub async fn create_gig(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateGigPayload>,
) -> AppResult<Json<Gig>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = create_gig_inner(&app_state, &claims, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/gigs",
        REQ_TYPE_GIG_CREATE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn create_gig_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    payload: CreateGigPayload,
) -> AppResult<Gig> {
    if !matches!(
        claims.parsed_role(),
        Some(UserRole::Client | UserRole::Admin)
    ) {
        return Err(AppError::Forbidden("only clients can post gigs".into()));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    if !payload.budget.is_finite() || payload.budget <= 0.0 {
        return Err(AppError::Validation("budget must be positive".into()));
    }
    app_state.gigs.create_gig(&claims.sub, payload).await
}

pub async fn list_gigs(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<GigQuery>,
) -> AppResult<Json<Vec<Gig>>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            GigStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown status `{}`", raw)))?,
        ),
    };
    let gigs = app_state
        .gigs
        .list_gigs(GigFilter {
            category: query.category,
            min_budget: query.min_budget,
            max_budget: query.max_budget,
            needle: query.q,
            status,
        })
        .await?;
    Ok(Json(gigs))
}

pub async fn get_gig(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Gig>> {
    let Some(gig) = app_state.gigs.get_gig(&id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    Ok(Json(gig))
}

pub async fn update_gig(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateGigPayload>,
) -> AppResult<Json<Gig>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = update_gig_inner(&app_state, &claims, &id, payload).await;
    log_result(
        &app_state,
        start,
        "PUT",
        &format!("/gigs/{}", id),
        REQ_TYPE_GIG_UPDATE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn update_gig_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
    payload: UpdateGigPayload,
) -> AppResult<Gig> {
    owned_gig(app_state, id, claims).await?;
    if let Some(budget) = payload.budget {
        if !budget.is_finite() || budget <= 0.0 {
            return Err(AppError::Validation("budget must be positive".into()));
        }
    }
    app_state
        .gigs
        .update_gig(id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("gig not found".into()))
}

pub async fn delete_gig(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = delete_gig_inner(&app_state, &claims, &id).await;
    log_result(
        &app_state,
        start,
        "DELETE",
        &format!("/gigs/{}", id),
        REQ_TYPE_GIG_DELETE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(|_| Json(serde_json::json!({ "deleted": true })))
}

async fn delete_gig_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
) -> AppResult<()> {
    owned_gig(app_state, id, claims).await?;
    app_state.gigs.delete_gig(id).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
pub struct FeatureRequest {
    #[serde(default = "default_featured")]
    pub featured: bool,
}

fn default_featured() -> bool {
    true
}

// 推广位是付费订阅权益；订阅状态以本地镜像为准
pub async fn feature_gig(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<FeatureRequest>>,
) -> AppResult<Json<Gig>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let featured = payload.map(|Json(p)| p.featured).unwrap_or(true);
    let result = feature_gig_inner(&app_state, &claims, &id, featured).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/gigs/{}/feature", id),
        REQ_TYPE_GIG_FEATURE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn feature_gig_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
    featured: bool,
) -> AppResult<Gig> {
    owned_gig(app_state, id, claims).await?;

    if !claims.is_admin() {
        let premium = app_state
            .subscriptions
            .get_subscription_for_user(&claims.sub)
            .await?
            .map(|s| s.status.grants_premium())
            .unwrap_or(false);
        if !premium {
            return Err(AppError::Forbidden(
                "featured listings require an active subscription".into(),
            ));
        }
    }

    app_state.gigs.set_gig_featured(id, featured).await?;
    app_state
        .gigs
        .get_gig(id)
        .await?
        .ok_or_else(|| AppError::NotFound("gig not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gigs::CreateGigPayload;
    use crate::server::handlers::auth::{AccessTokenClaims, issue_access_token};
    use crate::server::test_support::{RecordingProcessor, router_for, state_with_processor};
    use crate::subscription::{SubscriptionStatus, SubscriptionUpsert};
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

    fn post(uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn creatives_cannot_post_gigs() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let creative = make_user(&state, "creative@example.com", UserRole::Creative).await;

        let resp = router_for(state.clone())
            .oneshot(post(
                "/gigs",
                &token_for(&creative),
                Some(serde_json::json!({
                    "title": "My gig",
                    "description": "desc",
                    "category": "design",
                    "budget": 100.0
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn featuring_requires_a_premium_subscription() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let token = token_for(&client);
        let gig = state
            .gigs
            .create_gig(
                &client.id,
                CreateGigPayload {
                    title: "Brand refresh".into(),
                    description: "full rebrand".into(),
                    category: "design".into(),
                    budget: 2000.0,
                    currency: "usd".into(),
                    deadline: None,
                },
            )
            .await
            .unwrap();
        let uri = format!("/gigs/{}/feature", gig.id);

        // 无订阅 → 403
        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // canceled 订阅不授予权益
        state
            .subscriptions
            .upsert_subscription(SubscriptionUpsert {
                user_id: client.id.clone(),
                plan_id: "plan_pro".into(),
                status: SubscriptionStatus::Canceled,
                current_period_end: None,
                cancel_at_period_end: false,
                processor_subscription_id: Some("sub_1".into()),
            })
            .await
            .unwrap();
        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        state
            .subscriptions
            .upsert_subscription(SubscriptionUpsert {
                user_id: client.id.clone(),
                plan_id: "plan_pro".into(),
                status: SubscriptionStatus::Active,
                current_period_end: None,
                cancel_at_period_end: false,
                processor_subscription_id: Some("sub_1".into()),
            })
            .await
            .unwrap();
        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let gig = state.gigs.get_gig(&gig.id).await.unwrap().unwrap();
        assert!(gig.featured);
    }

    #[tokio::test]
    async fn admins_feature_without_subscription() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let admin = make_user(&state, "admin@example.com", UserRole::Admin).await;
        let gig = state
            .gigs
            .create_gig(
                &client.id,
                CreateGigPayload {
                    title: "Site build".into(),
                    description: "marketing site".into(),
                    category: "dev".into(),
                    budget: 3000.0,
                    currency: "usd".into(),
                    deadline: None,
                },
            )
            .await
            .unwrap();

        let resp = router_for(state.clone())
            .oneshot(post(
                &format!("/gigs/{}/feature", gig.id),
                &token_for(&admin),
                Some(serde_json::json!({ "featured": true })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_status_filter_is_rejected() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;

        let resp = router_for(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/gigs?status=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
