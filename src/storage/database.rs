use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::storage::time::{parse_iso8601, to_iso8601};
use crate::storage::types::{RequestLog, RequestLogStore};

// SQLite 后端：单连接加互斥锁（请求量级下足够），建表幂等。
// 各领域的 trait 实现见同目录 database_*.rs。
#[derive(Clone)]
pub struct Database {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self, AppError> {
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                display_name TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                skills TEXT NOT NULL DEFAULT '[]',
                hourly_rate REAL,
                avatar_url TEXT,
                role TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS gigs (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                budget REAL NOT NULL,
                currency TEXT NOT NULL,
                deadline TEXT,
                status TEXT NOT NULL,
                featured INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                creative_id TEXT NOT NULL,
                cover_letter TEXT NOT NULL,
                proposed_rate REAL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (gig_id, creative_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                gig_id TEXT,
                body TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                reviewer_id TEXT NOT NULL,
                reviewee_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                UNIQUE (gig_id, reviewer_id)
            )",
            [],
        )?;

        // 支付行只增不改删（审计轨迹），状态列除外
        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                gig_id TEXT,
                client_id TEXT NOT NULL,
                creative_id TEXT,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_type TEXT NOT NULL,
                processor_intent_id TEXT,
                processor_customer_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // escrow 与 payment 严格 1:1
        conn.execute(
            "CREATE TABLE IF NOT EXISTS escrows (
                id TEXT PRIMARY KEY,
                payment_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                release_date TEXT,
                dispute_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS milestones (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                amount REAL NOT NULL,
                due_date TEXT,
                status TEXT NOT NULL,
                payment_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                plan_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_period_end TEXT,
                cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
                processor_subscription_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS customers (
                user_id TEXT PRIMARY KEY,
                processor_customer_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS request_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                request_type TEXT NOT NULL,
                user_id TEXT,
                status_code INTEGER NOT NULL,
                response_time_ms INTEGER NOT NULL,
                error_message TEXT
            )",
            [],
        )?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl RequestLogStore for Database {
    async fn log_request(&self, log: RequestLog) -> Result<i64, AppError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO request_logs (
                timestamp, method, path, request_type, user_id,
                status_code, response_time_ms, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                to_iso8601(&log.timestamp),
                &log.method,
                &log.path,
                &log.request_type,
                &log.user_id,
                log.status_code,
                log.response_time_ms,
                &log.error_message,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn get_recent_logs(&self, limit: i64) -> Result<Vec<RequestLog>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, method, path, request_type, user_id,
                    status_code, response_time_ms, error_message
             FROM request_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, u16>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, ts, method, path, request_type, user_id, status_code, rt, err) = row?;
            out.push(RequestLog {
                id: Some(id),
                timestamp: parse_iso8601(&ts)?,
                method,
                path,
                request_type,
                user_id,
                status_code,
                response_time_ms: rt,
                error_message: err,
            });
        }
        Ok(out)
    }
}
