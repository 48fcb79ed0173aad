use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::milestones::{
    CreateMilestonePayload, Milestone, MilestoneStatus, MilestoneStore,
};
use crate::storage::postgres_store::{PgStore, pg_row_opt_datetime, pg_row_opt_string};

const MILESTONE_COLUMNS: &str = "id, gig_id, title, description, amount, due_date, status, \
                                 payment_id, created_at, updated_at";

fn milestone_from_row(row: &Row) -> Milestone {
    let status_raw: String = row.get(6);
    Milestone {
        id: row.get(0),
        gig_id: row.get(1),
        title: row.get(2),
        description: row.get(3),
        amount: row.get(4),
        due_date: pg_row_opt_datetime(row, 5),
        status: MilestoneStatus::parse(&status_raw).unwrap_or(MilestoneStatus::Pending),
        payment_id: pg_row_opt_string(row, 7),
        created_at: row.get(8),
        updated_at: row.get(9),
    }
}

#[async_trait]
impl MilestoneStore for PgStore {
    async fn create_milestone(
        &self,
        gig_id: &str,
        payload: CreateMilestonePayload,
    ) -> Result<Milestone, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO milestones (id, gig_id, title, description, amount, due_date,
                                         status, payment_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, 'pending', NULL, $7, $7)",
                &[
                    &id,
                    &gig_id,
                    &payload.title,
                    &payload.description,
                    &payload.amount,
                    &payload.due_date,
                    &now,
                ],
            )
            .await?;

        Ok(Milestone {
            id,
            gig_id: gig_id.to_string(),
            title: payload.title,
            description: payload.description,
            amount: payload.amount,
            due_date: payload.due_date,
            status: MilestoneStatus::Pending,
            payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_milestone(&self, id: &str) -> Result<Option<Milestone>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM milestones WHERE id = $1", MILESTONE_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| milestone_from_row(&r)))
    }

    async fn get_milestone_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Milestone>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM milestones WHERE payment_id = $1",
                    MILESTONE_COLUMNS
                ),
                &[&payment_id],
            )
            .await?;
        Ok(row.map(|r| milestone_from_row(&r)))
    }

    async fn list_milestones_for_gig(&self, gig_id: &str) -> Result<Vec<Milestone>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM milestones WHERE gig_id = $1 ORDER BY created_at ASC",
                    MILESTONE_COLUMNS
                ),
                &[&gig_id],
            )
            .await?;
        Ok(rows.iter().map(milestone_from_row).collect())
    }

    async fn set_milestone_status(
        &self,
        id: &str,
        status: MilestoneStatus,
        payment_id: Option<String>,
    ) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE milestones SET status = $2,
                                       payment_id = COALESCE($3, payment_id),
                                       updated_at = $4
                 WHERE id = $1",
                &[&id, &status.as_str(), &payment_id, &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }
}
