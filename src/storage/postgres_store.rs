use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio_postgres::{Client, NoTls, Row};

use crate::error::AppError;
use crate::storage::types::{RequestLog, RequestLogStore};

pub struct PgPool {
    clients: Vec<Arc<Client>>,
    next: AtomicUsize,
}

impl PgPool {
    async fn connect_many(
        pg_url: &str,
        schema: &Option<String>,
        size: usize,
    ) -> Result<Self, AppError> {
        let mut clients = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            let (client, connection) = tokio_postgres::connect(pg_url, NoTls)
                .await
                .map_err(|e| AppError::Config(format!("Failed to connect postgres: {}", e)))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("postgres connection error: {}", e);
                }
            });
            if let Some(s) = schema {
                client
                    .execute(&format!("SET search_path TO {}", s), &[])
                    .await
                    .map_err(|e| AppError::Config(format!("Failed to set search_path: {}", e)))?;
            }
            let client = Arc::new(client);
            spawn_keepalive(Arc::clone(&client), 240, 420);
            clients.push(client);
        }
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pick(&self) -> Arc<Client> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Arc::clone(&self.clients[idx])
    }
}

// 轻量保活：带抖动错峰，尽力而为，出错由下一轮重试
fn spawn_keepalive(client: Arc<Client>, min_secs: u64, max_secs: u64) {
    let max_secs = max_secs.max(min_secs + 1);
    tokio::spawn(async move {
        loop {
            let jitter = {
                let mut rng = rand::rng();
                rng.random_range(min_secs..=max_secs)
            };
            tokio::time::sleep(std::time::Duration::from_secs(jitter)).await;
            let c = Arc::clone(&client);
            let _ = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                c.execute("SELECT 1", &[]),
            )
            .await;
        }
    });
}

pub(crate) fn pg_row_opt_string(row: &Row, idx: usize) -> Option<String> {
    row.try_get::<usize, Option<String>>(idx)
        .ok()
        .flatten()
        .or_else(|| row.try_get::<usize, String>(idx).ok())
}

pub(crate) fn pg_row_bool_or(row: &Row, idx: usize, default: bool) -> bool {
    row.try_get::<usize, bool>(idx)
        .ok()
        .or_else(|| row.try_get::<usize, Option<bool>>(idx).ok().flatten())
        .unwrap_or(default)
}

pub(crate) fn pg_row_opt_datetime(row: &Row, idx: usize) -> Option<DateTime<Utc>> {
    row.try_get::<usize, Option<DateTime<Utc>>>(idx)
        .ok()
        .flatten()
}

// PostgreSQL 后端：小型手写连接池 + 每领域一个实现文件（postgres_*.rs）
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        pg_url: &str,
        schema: &Option<String>,
        pool_size: usize,
    ) -> Result<Self, AppError> {
        let pool = PgPool::connect_many(pg_url, schema, pool_size).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), AppError> {
        let client = self.pool.pick();
        let statements = [
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                display_name TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                skills TEXT NOT NULL DEFAULT '[]',
                hourly_rate DOUBLE PRECISION,
                avatar_url TEXT,
                role TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS gigs (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                budget DOUBLE PRECISION NOT NULL,
                currency TEXT NOT NULL,
                deadline TIMESTAMPTZ,
                status TEXT NOT NULL,
                featured BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                creative_id TEXT NOT NULL,
                cover_letter TEXT NOT NULL,
                proposed_rate DOUBLE PRECISION,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (gig_id, creative_id)
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                gig_id TEXT,
                body TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                reviewer_id TEXT NOT NULL,
                reviewee_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (gig_id, reviewer_id)
            )",
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                gig_id TEXT,
                client_id TEXT NOT NULL,
                creative_id TEXT,
                amount BIGINT NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_type TEXT NOT NULL,
                processor_intent_id TEXT,
                processor_customer_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS escrows (
                id TEXT PRIMARY KEY,
                payment_id TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                release_date TIMESTAMPTZ,
                dispute_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS milestones (
                id TEXT PRIMARY KEY,
                gig_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                amount DOUBLE PRECISION NOT NULL,
                due_date TIMESTAMPTZ,
                status TEXT NOT NULL,
                payment_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                plan_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_period_end TIMESTAMPTZ,
                cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
                processor_subscription_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS customers (
                user_id TEXT PRIMARY KEY,
                processor_customer_id TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS request_logs (
                id BIGSERIAL PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                request_type TEXT NOT NULL,
                user_id TEXT,
                status_code INTEGER NOT NULL,
                response_time_ms BIGINT NOT NULL,
                error_message TEXT
            )",
        ];
        for stmt in statements {
            client.execute(stmt, &[]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RequestLogStore for PgStore {
    async fn log_request(&self, log: RequestLog) -> Result<i64, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_one(
                "INSERT INTO request_logs (timestamp, method, path, request_type, user_id,
                                           status_code, response_time_ms, error_message)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING id",
                &[
                    &log.timestamp,
                    &log.method,
                    &log.path,
                    &log.request_type,
                    &log.user_id,
                    &(log.status_code as i32),
                    &log.response_time_ms,
                    &log.error_message,
                ],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn get_recent_logs(&self, limit: i64) -> Result<Vec<RequestLog>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                "SELECT id, timestamp, method, path, request_type, user_id,
                        status_code, response_time_ms, error_message
                 FROM request_logs ORDER BY id DESC LIMIT $1",
                &[&limit],
            )
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(RequestLog {
                id: Some(row.get(0)),
                timestamp: row.get(1),
                method: row.get(2),
                path: row.get(3),
                request_type: row.get(4),
                user_id: pg_row_opt_string(&row, 5),
                status_code: row.get::<usize, i32>(6) as u16,
                response_time_ms: row.get(7),
                error_message: pg_row_opt_string(&row, 8),
            });
        }
        Ok(out)
    }
}
