use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;

use super::auth::{AccessTokenClaims, ensure_access_token};
use crate::applications::{Application, ApplicationStatus, CreateApplicationPayload};
use crate::error::{AppError, Result as AppResult};
use crate::gigs::GigStatus;
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::{REQ_TYPE_APPLICATION_CREATE, REQ_TYPE_APPLICATION_STATUS};
use crate::users::UserRole;

pub async fn apply(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(gig_id): Path<String>,
    Json(payload): Json<CreateApplicationPayload>,
) -> AppResult<Json<Application>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = apply_inner(&app_state, &claims, &gig_id, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/gigs/{}/applications", gig_id),
        REQ_TYPE_APPLICATION_CREATE,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn apply_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    gig_id: &str,
    payload: CreateApplicationPayload,
) -> AppResult<Application> {
    if claims.parsed_role() != Some(UserRole::Creative) {
        return Err(AppError::Forbidden("only creatives can apply".into()));
    }
    let Some(gig) = app_state.gigs.get_gig(gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.status != GigStatus::Open {
        return Err(AppError::Validation("gig is not open for applications".into()));
    }
    if gig.client_id == claims.sub {
        return Err(AppError::Validation("cannot apply to your own gig".into()));
    }
    if app_state
        .applications
        .get_application_for_gig(gig_id, &claims.sub)
        .await?
        .is_some()
    {
        return Err(AppError::Validation("already applied to this gig".into()));
    }

    app_state
        .applications
        .create_application(gig_id, &claims.sub, payload)
        .await
}

pub async fn list_for_gig(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(gig_id): Path<String>,
) -> AppResult<Json<Vec<Application>>> {
    let claims = ensure_access_token(&headers)?;
    let Some(gig) = app_state.gigs.get_gig(&gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };
    if gig.client_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden("not your gig".into()));
    }
    let apps = app_state.applications.list_applications_for_gig(&gig_id).await?;
    Ok(Json(apps))
}

pub async fn accept(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Application>> {
    transition(app_state, headers, id, ApplicationStatus::Accepted).await
}

pub async fn reject(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Application>> {
    transition(app_state, headers, id, ApplicationStatus::Rejected).await
}

pub async fn withdraw(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Application>> {
    transition(app_state, headers, id, ApplicationStatus::Withdrawn).await
}

async fn transition(
    app_state: Arc<AppState>,
    headers: HeaderMap,
    id: String,
    target: ApplicationStatus,
) -> AppResult<Json<Application>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = transition_inner(&app_state, &claims, &id, target).await;
    log_result(
        &app_state,
        start,
        "POST",
        &format!("/applications/{}/{}", id, target.as_str()),
        REQ_TYPE_APPLICATION_STATUS,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn transition_inner(
    app_state: &AppState,
    claims: &AccessTokenClaims,
    id: &str,
    target: ApplicationStatus,
) -> AppResult<Application> {
    let Some(app) = app_state.applications.get_application(id).await? else {
        return Err(AppError::NotFound("application not found".into()));
    };
    let Some(gig) = app_state.gigs.get_gig(&app.gig_id).await? else {
        return Err(AppError::NotFound("gig not found".into()));
    };

    match target {
        // 接受/拒绝：仅 gig 所有者；撤回：仅申请人
        ApplicationStatus::Accepted | ApplicationStatus::Rejected => {
            if gig.client_id != claims.sub && !claims.is_admin() {
                return Err(AppError::Forbidden("not your gig".into()));
            }
        }
        ApplicationStatus::Withdrawn => {
            if app.creative_id != claims.sub {
                return Err(AppError::Forbidden("not your application".into()));
            }
        }
        ApplicationStatus::Pending => {
            return Err(AppError::Validation("cannot reset to pending".into()));
        }
    }

    if app.status != ApplicationStatus::Pending {
        return Err(AppError::Validation(format!(
            "application is already {}",
            app.status.as_str()
        )));
    }

    app_state.applications.set_application_status(id, target).await?;

    if target == ApplicationStatus::Accepted {
        // 中标后其余 pending 申请整体拒绝，gig 进入进行中
        app_state
            .applications
            .reject_other_pending(&app.gig_id, id)
            .await?;
        app_state
            .gigs
            .set_gig_status(&app.gig_id, GigStatus::InProgress)
            .await?;
    }

    app_state
        .applications
        .get_application(id)
        .await?
        .ok_or_else(|| AppError::NotFound("application not found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gigs::{CreateGigPayload, GigStatus};
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
                    title: "Poster design".into(),
                    description: "a3 poster".into(),
                    category: "design".into(),
                    budget: 150.0,
                    currency: "usd".into(),
                    deadline: None,
                },
            )
            .await
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
    async fn clients_cannot_apply_and_duplicates_are_rejected() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let creative = make_user(&state, "creative@example.com", UserRole::Creative).await;
        let gig = make_gig(&state, &client.id).await;
        let uri = format!("/gigs/{}/applications", gig.id);
        let body = serde_json::json!({ "coverLetter": "pick me" });

        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token_for(&client), Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token_for(&creative), Some(body.clone())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // 同一创作者对同一 gig 只能投递一次
        let resp = router_for(state.clone())
            .oneshot(post(&uri, &token_for(&creative), Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepting_one_application_rejects_the_rest() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let first = make_user(&state, "first@example.com", UserRole::Creative).await;
        let second = make_user(&state, "second@example.com", UserRole::Creative).await;
        let gig = make_gig(&state, &client.id).await;

        let a1 = state
            .applications
            .create_application(
                &gig.id,
                &first.id,
                CreateApplicationPayload {
                    cover_letter: "me first".into(),
                    proposed_rate: Some(40.0),
                },
            )
            .await
            .unwrap();
        let a2 = state
            .applications
            .create_application(
                &gig.id,
                &second.id,
                CreateApplicationPayload {
                    cover_letter: "me too".into(),
                    proposed_rate: None,
                },
            )
            .await
            .unwrap();

        // 申请人不能裁决
        let resp = router_for(state.clone())
            .oneshot(post(
                &format!("/applications/{}/accept", a1.id),
                &token_for(&first),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = router_for(state.clone())
            .oneshot(post(
                &format!("/applications/{}/accept", a1.id),
                &token_for(&client),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let a1 = state.applications.get_application(&a1.id).await.unwrap().unwrap();
        let a2 = state.applications.get_application(&a2.id).await.unwrap().unwrap();
        assert_eq!(a1.status, ApplicationStatus::Accepted);
        assert_eq!(a2.status, ApplicationStatus::Rejected);

        let gig = state.gigs.get_gig(&gig.id).await.unwrap().unwrap();
        assert_eq!(gig.status, GigStatus::InProgress);

        // 已裁决的申请不能再撤回
        let resp = router_for(state.clone())
            .oneshot(post(
                &format!("/applications/{}/withdraw", a1.id),
                &token_for(&first),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_the_gig_owner_lists_applications() {
        let dir = tempdir().unwrap();
        let state = state_with_processor(&dir, Arc::new(RecordingProcessor::new())).await;
        let client = make_user(&state, "client@example.com", UserRole::Client).await;
        let stranger = make_user(&state, "stranger@example.com", UserRole::Creative).await;
        let gig = make_gig(&state, &client.id).await;
        let uri = format!("/gigs/{}/applications", gig.id);

        let resp = router_for(state.clone())
            .oneshot(
                Request::builder()
                    .uri(&uri)
                    .header(AUTHORIZATION, format!("Bearer {}", token_for(&stranger)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = router_for(state.clone())
            .oneshot(
                Request::builder()
                    .uri(&uri)
                    .header(AUTHORIZATION, format!("Bearer {}", token_for(&client)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
