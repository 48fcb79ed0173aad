use std::sync::Arc;

use axum::extract::State;
use axum::{Json, http::HeaderMap};
use chrono::{Duration, Utc};
use serde::Serialize;

use super::auth::{AccessTokenClaims, ensure_access_token, issue_access_token, jwt_ttl_secs};
use crate::error::{AppError, Result as AppResult};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::{REQ_TYPE_AUTH_LOGIN, REQ_TYPE_AUTH_REGISTER};
use crate::users::{CreateUserPayload, User, verify_password};

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub expires_at: String,
    pub user: User,
}

fn issue_for_user(user: &User) -> AppResult<(String, String)> {
    let now = Utc::now();
    let exp = now + Duration::seconds(jwt_ttl_secs() as i64);
    let claims = AccessTokenClaims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        exp: exp.timestamp(),
        iat: Some(now.timestamp()),
    };
    Ok((issue_access_token(&claims)?, exp.to_rfc3339()))
}

pub async fn register(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserPayload>,
) -> AppResult<Json<AuthResponse>> {
    let start = Utc::now();
    let result = register_inner(&app_state, payload).await;
    let user_id = result.as_ref().ok().map(|r| r.user.id.clone());
    log_result(
        &app_state,
        start,
        "POST",
        "/auth/register",
        REQ_TYPE_AUTH_REGISTER,
        user_id.as_deref(),
        &result,
    )
    .await;
    result.map(Json)
}

async fn register_inner(
    app_state: &AppState,
    payload: CreateUserPayload,
) -> AppResult<AuthResponse> {
    if !payload.email.contains('@') {
        return Err(AppError::Validation("invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if app_state
        .users
        .get_user_by_email(&payload.email)
        .await?
        .is_some()
    {
        return Err(AppError::Validation("email already registered".into()));
    }

    let user = app_state.users.create_user(payload).await?;
    let (access_token, expires_at) = issue_for_user(&user)?;
    Ok(AuthResponse {
        access_token,
        expires_at,
        user,
    })
}

pub async fn login(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let start = Utc::now();
    let result = login_inner(&app_state, payload).await;
    let user_id = result.as_ref().ok().map(|r| r.user.id.clone());
    log_result(
        &app_state,
        start,
        "POST",
        "/auth/login",
        REQ_TYPE_AUTH_LOGIN,
        user_id.as_deref(),
        &result,
    )
    .await;
    result.map(Json)
}

async fn login_inner(app_state: &AppState, payload: LoginRequest) -> AppResult<AuthResponse> {
    let Some(user) = app_state.users.get_user_by_email(&payload.email).await? else {
        return Err(AppError::Unauthorized("invalid credentials".into()));
    };
    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }

    let (access_token, expires_at) = issue_for_user(&user)?;
    Ok(AuthResponse {
        access_token,
        expires_at,
        user,
    })
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<User>> {
    let claims = ensure_access_token(&headers)?;
    let Some(user) = app_state.users.get_user(&claims.sub).await? else {
        return Err(AppError::Unauthorized("user no longer exists".into()));
    };
    Ok(Json(user))
}
