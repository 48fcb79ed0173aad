use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::applications::{
    Application, ApplicationStatus, ApplicationStore, CreateApplicationPayload,
};
use crate::error::AppError;
use crate::storage::postgres_store::PgStore;

const APP_COLUMNS: &str =
    "id, gig_id, creative_id, cover_letter, proposed_rate, status, created_at, updated_at";

fn application_from_row(row: &Row) -> Application {
    let status_raw: String = row.get(5);
    Application {
        id: row.get(0),
        gig_id: row.get(1),
        creative_id: row.get(2),
        cover_letter: row.get(3),
        proposed_rate: row.get(4),
        status: ApplicationStatus::parse(&status_raw).unwrap_or(ApplicationStatus::Pending),
        created_at: row.get(6),
        updated_at: row.get(7),
    }
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn create_application(
        &self,
        gig_id: &str,
        creative_id: &str,
        payload: CreateApplicationPayload,
    ) -> Result<Application, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO applications (id, gig_id, creative_id, cover_letter, proposed_rate,
                                           status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)",
                &[
                    &id,
                    &gig_id,
                    &creative_id,
                    &payload.cover_letter,
                    &payload.proposed_rate,
                    &now,
                ],
            )
            .await?;

        Ok(Application {
            id,
            gig_id: gig_id.to_string(),
            creative_id: creative_id.to_string(),
            cover_letter: payload.cover_letter,
            proposed_rate: payload.proposed_rate,
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_application(&self, id: &str) -> Result<Option<Application>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM applications WHERE id = $1", APP_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| application_from_row(&r)))
    }

    async fn get_application_for_gig(
        &self,
        gig_id: &str,
        creative_id: &str,
    ) -> Result<Option<Application>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM applications WHERE gig_id = $1 AND creative_id = $2",
                    APP_COLUMNS
                ),
                &[&gig_id, &creative_id],
            )
            .await?;
        Ok(row.map(|r| application_from_row(&r)))
    }

    async fn list_applications_for_gig(&self, gig_id: &str) -> Result<Vec<Application>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM applications WHERE gig_id = $1 ORDER BY created_at ASC",
                    APP_COLUMNS
                ),
                &[&gig_id],
            )
            .await?;
        Ok(rows.iter().map(application_from_row).collect())
    }

    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE applications SET status = $2, updated_at = $3 WHERE id = $1",
                &[&id, &status.as_str(), &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn reject_other_pending(
        &self,
        gig_id: &str,
        accepted_id: &str,
    ) -> Result<u64, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE applications SET status = 'rejected', updated_at = $3
                 WHERE gig_id = $1 AND id != $2 AND status = 'pending'",
                &[&gig_id, &accepted_id, &Utc::now()],
            )
            .await?;
        Ok(affected)
    }
}
