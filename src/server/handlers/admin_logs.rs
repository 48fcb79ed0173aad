use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Json, http::HeaderMap};
use serde::Deserialize;

use super::auth::ensure_access_token;
use crate::error::{AppError, Result as AppResult};
use crate::server::AppState;
use crate::storage::RequestLog;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

// 审计日志查询，仅管理员可见
pub async fn recent_logs(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> AppResult<Json<Vec<RequestLog>>> {
    let claims = ensure_access_token(&headers)?;
    if !claims.is_admin() {
        return Err(AppError::Forbidden("admin only".into()));
    }
    let limit = query.limit.clamp(1, 1000);
    let logs = app_state.log_store.get_recent_logs(limit).await?;
    Ok(Json(logs))
}
