use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};

use super::auth::ensure_access_token;
use crate::error::{AppError, Result as AppResult};
use crate::server::AppState;
use crate::users::{UpdateUserPayload, User};

pub async fn get_profile(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let Some(user) = app_state.users.get_user(&id).await? else {
        return Err(AppError::NotFound("user not found".into()));
    };
    Ok(Json(user))
}

pub async fn update_me(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUserPayload>,
) -> AppResult<Json<User>> {
    let claims = ensure_access_token(&headers)?;

    if let Some(rate) = payload.hourly_rate {
        if !rate.is_finite() || rate < 0.0 {
            return Err(AppError::Validation("hourlyRate must be non-negative".into()));
        }
    }

    let Some(user) = app_state.users.update_user(&claims.sub, payload).await? else {
        return Err(AppError::NotFound("user not found".into()));
    };
    Ok(Json(user))
}
