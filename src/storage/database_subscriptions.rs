use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, parse_iso8601_opt, to_iso8601};
use crate::subscription::{
    Subscription, SubscriptionStatus, SubscriptionStore, SubscriptionUpsert,
};

const SUB_COLUMNS: &str = "id, user_id, plan_id, status, current_period_end, \
                           cancel_at_period_end, processor_subscription_id, created_at, updated_at";

struct SubscriptionRow {
    sub: Subscription,
    period_end_raw: Option<String>,
    created_raw: String,
    updated_raw: String,
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    let status_raw: String = row.get(3)?;
    Ok(SubscriptionRow {
        sub: Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan_id: row.get(2)?,
            status: SubscriptionStatus::parse(&status_raw)
                .unwrap_or(SubscriptionStatus::Incomplete),
            current_period_end: None,
            cancel_at_period_end: row.get::<_, i64>(5)? != 0,
            processor_subscription_id: row.get(6)?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        period_end_raw: row.get(4)?,
        created_raw: row.get(7)?,
        updated_raw: row.get(8)?,
    })
}

fn finish_subscription(parts: SubscriptionRow) -> Result<Subscription, AppError> {
    let mut sub = parts.sub;
    sub.current_period_end = parse_iso8601_opt(parts.period_end_raw)?;
    sub.created_at = parse_iso8601(&parts.created_raw)?;
    sub.updated_at = parse_iso8601(&parts.updated_raw)?;
    Ok(sub)
}

#[async_trait]
impl SubscriptionStore for Database {
    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO subscriptions (id, user_id, plan_id, status, current_period_end,
                                        cancel_at_period_end, processor_subscription_id,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT (user_id) DO UPDATE SET
                 plan_id = excluded.plan_id,
                 status = excluded.status,
                 current_period_end = excluded.current_period_end,
                 cancel_at_period_end = excluded.cancel_at_period_end,
                 processor_subscription_id = excluded.processor_subscription_id,
                 updated_at = excluded.updated_at",
            (
                &id,
                &upsert.user_id,
                &upsert.plan_id,
                upsert.status.as_str(),
                upsert.current_period_end.as_ref().map(to_iso8601),
                upsert.cancel_at_period_end as i64,
                &upsert.processor_subscription_id,
                to_iso8601(&now),
            ),
        )?;
        drop(conn);

        self.get_subscription_for_user(&upsert.user_id)
            .await?
            .ok_or_else(|| AppError::Db("subscription upsert did not persist".into()))
    }

    async fn get_subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM subscriptions WHERE user_id = ?1", SUB_COLUMNS),
                [user_id],
                subscription_from_row,
            )
            .optional()?;
        parts.map(finish_subscription).transpose()
    }

    async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE subscriptions SET status = ?2, updated_at = ?3 WHERE user_id = ?1",
            (user_id, status.as_str(), to_iso8601(&Utc::now())),
        )?;
        Ok(affected > 0)
    }
}
