use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::escrow::{Escrow, EscrowStatus, EscrowStore};
use crate::storage::postgres_store::{PgStore, pg_row_opt_datetime, pg_row_opt_string};

const ESCROW_COLUMNS: &str =
    "id, payment_id, status, release_date, dispute_reason, created_at, updated_at";

fn escrow_from_row(row: &Row) -> Escrow {
    let status_raw: String = row.get(2);
    Escrow {
        id: row.get(0),
        payment_id: row.get(1),
        status: EscrowStatus::parse(&status_raw).unwrap_or(EscrowStatus::Pending),
        release_date: pg_row_opt_datetime(row, 3),
        dispute_reason: pg_row_opt_string(row, 4),
        created_at: row.get(5),
        updated_at: row.get(6),
    }
}

#[async_trait]
impl EscrowStore for PgStore {
    async fn create_escrow(&self, payment_id: &str) -> Result<Escrow, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO escrows (id, payment_id, status, release_date, dispute_reason,
                                      created_at, updated_at)
                 VALUES ($1, $2, 'pending', NULL, NULL, $3, $3)",
                &[&id, &payment_id, &now],
            )
            .await?;

        Ok(Escrow {
            id,
            payment_id: payment_id.to_string(),
            status: EscrowStatus::Pending,
            release_date: None,
            dispute_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_escrow(&self, id: &str) -> Result<Option<Escrow>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM escrows WHERE id = $1", ESCROW_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| escrow_from_row(&r)))
    }

    async fn get_escrow_by_payment(&self, payment_id: &str) -> Result<Option<Escrow>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM escrows WHERE payment_id = $1", ESCROW_COLUMNS),
                &[&payment_id],
            )
            .await?;
        Ok(row.map(|r| escrow_from_row(&r)))
    }

    async fn set_escrow_status(
        &self,
        id: &str,
        status: EscrowStatus,
        release_date: Option<DateTime<Utc>>,
        dispute_reason: Option<String>,
    ) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE escrows SET status = $2,
                                    release_date = COALESCE($3, release_date),
                                    dispute_reason = COALESCE($4, dispute_reason),
                                    updated_at = $5
                 WHERE id = $1",
                &[&id, &status.as_str(), &release_date, &dispute_reason, &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }
}
