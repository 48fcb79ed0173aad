use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::server::AppState;
use crate::storage::RequestLog;

// 审计日志：记录变更类请求的结果与耗时；落库失败只打日志
pub async fn log_result<T>(
    app_state: &AppState,
    start_time: DateTime<Utc>,
    method: &str,
    path: &str,
    request_type: &str,
    user_id: Option<&str>,
    result: &Result<T, AppError>,
) {
    let end_time = Utc::now();
    let response_time_ms = (end_time - start_time).num_milliseconds();

    let (status_code, error_message) = match result {
        Ok(_) => (200, None),
        Err(e) => (e.status_code().as_u16(), Some(e.to_string())),
    };

    let log = RequestLog {
        id: None,
        timestamp: start_time,
        method: method.to_string(),
        path: path.to_string(),
        request_type: request_type.to_string(),
        user_id: user_id.map(|s| s.to_string()),
        status_code,
        response_time_ms,
        error_message,
    };

    if let Err(e) = app_state.log_store.log_request(log).await {
        tracing::error!("Failed to log request: {}", e);
    }
}
