use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Json, http::HeaderMap};
use chrono::Utc;

use super::auth::ensure_access_token;
use crate::error::{AppError, Result as AppResult};
use crate::messaging::{ConversationSummary, Message, SendMessagePayload};
use crate::server::AppState;
use crate::server::request_logging::log_result;
use crate::storage::types::REQ_TYPE_MESSAGE_SEND;

pub async fn send(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> AppResult<Json<Message>> {
    let start = Utc::now();
    let claims = ensure_access_token(&headers)?;
    let result = send_inner(&app_state, &claims.sub, payload).await;
    log_result(
        &app_state,
        start,
        "POST",
        "/messages",
        REQ_TYPE_MESSAGE_SEND,
        Some(&claims.sub),
        &result,
    )
    .await;
    result.map(Json)
}

async fn send_inner(
    app_state: &AppState,
    sender_id: &str,
    payload: SendMessagePayload,
) -> AppResult<Message> {
    if payload.body.trim().is_empty() {
        return Err(AppError::Validation("message body is empty".into()));
    }
    if payload.recipient_id == sender_id {
        return Err(AppError::Validation("cannot message yourself".into()));
    }
    if app_state.users.get_user(&payload.recipient_id).await?.is_none() {
        return Err(AppError::NotFound("recipient not found".into()));
    }
    app_state.messages.create_message(sender_id, payload).await
}

pub async fn list_conversations(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    let claims = ensure_access_token(&headers)?;
    let conversations = app_state.messages.list_conversations(&claims.sub).await?;
    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    let claims = ensure_access_token(&headers)?;
    let thread = app_state
        .messages
        .list_conversation(&claims.sub, &peer_id)
        .await?;
    Ok(Json(thread))
}

pub async fn mark_read(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let claims = ensure_access_token(&headers)?;
    let marked = app_state.messages.mark_read(&claims.sub, &peer_id).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}
