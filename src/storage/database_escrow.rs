use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::escrow::{Escrow, EscrowStatus, EscrowStore};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, parse_iso8601_opt, to_iso8601};

const ESCROW_COLUMNS: &str =
    "id, payment_id, status, release_date, dispute_reason, created_at, updated_at";

struct EscrowRow {
    escrow: Escrow,
    release_raw: Option<String>,
    created_raw: String,
    updated_raw: String,
}

fn escrow_from_row(row: &Row<'_>) -> rusqlite::Result<EscrowRow> {
    let status_raw: String = row.get(2)?;
    Ok(EscrowRow {
        escrow: Escrow {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            status: EscrowStatus::parse(&status_raw).unwrap_or(EscrowStatus::Pending),
            release_date: None,
            dispute_reason: row.get(4)?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        release_raw: row.get(3)?,
        created_raw: row.get(5)?,
        updated_raw: row.get(6)?,
    })
}

fn finish_escrow(parts: EscrowRow) -> Result<Escrow, AppError> {
    let mut escrow = parts.escrow;
    escrow.release_date = parse_iso8601_opt(parts.release_raw)?;
    escrow.created_at = parse_iso8601(&parts.created_raw)?;
    escrow.updated_at = parse_iso8601(&parts.updated_raw)?;
    Ok(escrow)
}

#[async_trait]
impl EscrowStore for Database {
    async fn create_escrow(&self, payment_id: &str) -> Result<Escrow, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO escrows (id, payment_id, status, release_date, dispute_reason,
                                  created_at, updated_at)
             VALUES (?1, ?2, 'pending', NULL, NULL, ?3, ?3)",
            (&id, payment_id, to_iso8601(&now)),
        )?;

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
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM escrows WHERE id = ?1", ESCROW_COLUMNS),
                [id],
                escrow_from_row,
            )
            .optional()?;
        parts.map(finish_escrow).transpose()
    }

    async fn get_escrow_by_payment(&self, payment_id: &str) -> Result<Option<Escrow>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM escrows WHERE payment_id = ?1", ESCROW_COLUMNS),
                [payment_id],
                escrow_from_row,
            )
            .optional()?;
        parts.map(finish_escrow).transpose()
    }

    async fn set_escrow_status(
        &self,
        id: &str,
        status: EscrowStatus,
        release_date: Option<chrono::DateTime<Utc>>,
        dispute_reason: Option<String>,
    ) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE escrows SET status = ?2,
                                release_date = COALESCE(?3, release_date),
                                dispute_reason = COALESCE(?4, dispute_reason),
                                updated_at = ?5
             WHERE id = ?1",
            (
                id,
                status.as_str(),
                release_date.as_ref().map(to_iso8601),
                dispute_reason,
                to_iso8601(&Utc::now()),
            ),
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn escrow_is_one_to_one_with_payment() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

        let escrow = db.create_escrow("pay_1").await.unwrap();
        assert_eq!(escrow.status, EscrowStatus::Pending);

        // 同一笔支付不能再挂第二个 escrow
        assert!(db.create_escrow("pay_1").await.is_err());

        let by_payment = db.get_escrow_by_payment("pay_1").await.unwrap().unwrap();
        assert_eq!(by_payment.id, escrow.id);
    }

    #[tokio::test]
    async fn status_update_keeps_earlier_fields() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

        let escrow = db.create_escrow("pay_1").await.unwrap();
        db.set_escrow_status(&escrow.id, EscrowStatus::Funded, None, None)
            .await
            .unwrap();
        db.set_escrow_status(
            &escrow.id,
            EscrowStatus::Disputed,
            None,
            Some("work not delivered".into()),
        )
        .await
        .unwrap();

        let fetched = db.get_escrow(&escrow.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EscrowStatus::Disputed);
        assert_eq!(fetched.dispute_reason.as_deref(), Some("work not delivered"));

        // 后续裁决不抹掉争议原因
        db.set_escrow_status(&escrow.id, EscrowStatus::Refunded, None, None)
            .await
            .unwrap();
        let fetched = db.get_escrow(&escrow.id).await.unwrap().unwrap();
        assert_eq!(fetched.dispute_reason.as_deref(), Some("work not delivered"));
    }
}
