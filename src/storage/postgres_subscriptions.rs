use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::postgres_store::{PgStore, pg_row_bool_or, pg_row_opt_datetime, pg_row_opt_string};
use crate::subscription::{
    Subscription, SubscriptionStatus, SubscriptionStore, SubscriptionUpsert,
};

const SUB_COLUMNS: &str = "id, user_id, plan_id, status, current_period_end, \
                           cancel_at_period_end, processor_subscription_id, created_at, updated_at";

fn subscription_from_row(row: &Row) -> Subscription {
    let status_raw: String = row.get(3);
    Subscription {
        id: row.get(0),
        user_id: row.get(1),
        plan_id: row.get(2),
        status: SubscriptionStatus::parse(&status_raw).unwrap_or(SubscriptionStatus::Incomplete),
        current_period_end: pg_row_opt_datetime(row, 4),
        cancel_at_period_end: pg_row_bool_or(row, 5, false),
        processor_subscription_id: pg_row_opt_string(row, 6),
        created_at: row.get(7),
        updated_at: row.get(8),
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn upsert_subscription(
        &self,
        upsert: SubscriptionUpsert,
    ) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO subscriptions (id, user_id, plan_id, status, current_period_end,
                                            cancel_at_period_end, processor_subscription_id,
                                            created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                 ON CONFLICT (user_id) DO UPDATE SET
                     plan_id = EXCLUDED.plan_id,
                     status = EXCLUDED.status,
                     current_period_end = EXCLUDED.current_period_end,
                     cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                     processor_subscription_id = EXCLUDED.processor_subscription_id,
                     updated_at = EXCLUDED.updated_at",
                &[
                    &id,
                    &upsert.user_id,
                    &upsert.plan_id,
                    &upsert.status.as_str(),
                    &upsert.current_period_end,
                    &upsert.cancel_at_period_end,
                    &upsert.processor_subscription_id,
                    &now,
                ],
            )
            .await?;

        self.get_subscription_for_user(&upsert.user_id)
            .await?
            .ok_or_else(|| AppError::Db("subscription upsert did not persist".into()))
    }

    async fn get_subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM subscriptions WHERE user_id = $1", SUB_COLUMNS),
                &[&user_id],
            )
            .await?;
        Ok(row.map(|r| subscription_from_row(&r)))
    }

    async fn set_subscription_status(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE subscriptions SET status = $2, updated_at = $3 WHERE user_id = $1",
                &[&user_id, &status.as_str(), &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }
}
