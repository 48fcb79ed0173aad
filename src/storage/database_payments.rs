use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::payments::{
    CustomerMapping, CustomerStore, NewPayment, Payment, PaymentStatus, PaymentStore, PaymentType,
};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, to_iso8601};

const PAYMENT_COLUMNS: &str = "id, gig_id, client_id, creative_id, amount, currency, status, \
                               payment_type, processor_intent_id, processor_customer_id, \
                               created_at, updated_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<(Payment, String, String)> {
    let status_raw: String = row.get(6)?;
    let type_raw: String = row.get(7)?;
    Ok((
        Payment {
            id: row.get(0)?,
            gig_id: row.get(1)?,
            client_id: row.get(2)?,
            creative_id: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            status: PaymentStatus::parse(&status_raw).unwrap_or(PaymentStatus::Pending),
            payment_type: PaymentType::parse(&type_raw).unwrap_or(PaymentType::Final),
            processor_intent_id: row.get(8)?,
            processor_customer_id: row.get(9)?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get(10)?,
        row.get(11)?,
    ))
}

fn finish_payment(parts: (Payment, String, String)) -> Result<Payment, AppError> {
    let (mut payment, created_raw, updated_raw) = parts;
    payment.created_at = parse_iso8601(&created_raw)?;
    payment.updated_at = parse_iso8601(&updated_raw)?;
    Ok(payment)
}

#[async_trait]
impl PaymentStore for Database {
    async fn create_payment(&self, new: NewPayment) -> Result<Payment, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO payments (id, gig_id, client_id, creative_id, amount, currency,
                                   status, payment_type, processor_intent_id,
                                   processor_customer_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            (
                &id,
                &new.gig_id,
                &new.client_id,
                &new.creative_id,
                new.amount,
                &new.currency,
                new.status.as_str(),
                new.payment_type.as_str(),
                &new.processor_intent_id,
                &new.processor_customer_id,
                to_iso8601(&now),
            ),
        )?;

        Ok(Payment {
            id,
            gig_id: new.gig_id,
            client_id: new.client_id,
            creative_id: new.creative_id,
            amount: new.amount,
            currency: new.currency,
            status: new.status,
            payment_type: new.payment_type,
            processor_intent_id: new.processor_intent_id,
            processor_customer_id: new.processor_customer_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS),
                [id],
                payment_from_row,
            )
            .optional()?;
        parts.map(finish_payment).transpose()
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!(
                    "SELECT {} FROM payments WHERE processor_intent_id = ?1",
                    PAYMENT_COLUMNS
                ),
                [intent_id],
                payment_from_row,
            )
            .optional()?;
        parts.map(finish_payment).transpose()
    }

    async fn list_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments
             WHERE client_id = ?1 OR creative_id = ?1
             ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([user_id], payment_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_payment(row?)?);
        }
        Ok(out)
    }

    async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE payments SET status = ?2, updated_at = ?3 WHERE id = ?1",
            (id, status.as_str(), to_iso8601(&Utc::now())),
        )?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl CustomerStore for Database {
    async fn upsert_customer(
        &self,
        user_id: &str,
        processor_customer_id: &str,
    ) -> Result<CustomerMapping, AppError> {
        let now = Utc::now();
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO customers (user_id, processor_customer_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET processor_customer_id = excluded.processor_customer_id",
            (user_id, processor_customer_id, to_iso8601(&now)),
        )?;
        Ok(CustomerMapping {
            user_id: user_id.to_string(),
            processor_customer_id: processor_customer_id.to_string(),
            created_at: now,
        })
    }

    async fn get_user_by_customer(
        &self,
        processor_customer_id: &str,
    ) -> Result<Option<String>, AppError> {
        let conn = self.connection.lock().await;
        let user_id = conn
            .query_row(
                "SELECT user_id FROM customers WHERE processor_customer_id = ?1",
                [processor_customer_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(user_id)
    }

    async fn get_customer_for_user(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let conn = self.connection.lock().await;
        let customer_id = conn
            .query_row(
                "SELECT processor_customer_id FROM customers WHERE user_id = ?1",
                [user_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    fn escrow_payment(intent: &str) -> NewPayment {
        NewPayment {
            gig_id: Some("g1".into()),
            client_id: "c1".into(),
            creative_id: Some("cr1".into()),
            amount: 1000,
            currency: "usd".into(),
            status: PaymentStatus::Pending,
            payment_type: PaymentType::Escrow,
            processor_intent_id: Some(intent.into()),
            processor_customer_id: None,
        }
    }

    #[tokio::test]
    async fn payment_lifecycle() {
        let (_dir, db) = test_db().await;
        let payment = db.create_payment(escrow_payment("pi_1")).await.unwrap();

        let by_intent = db.get_payment_by_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(by_intent.id, payment.id);
        assert_eq!(by_intent.amount, 1000);

        assert!(db
            .set_payment_status(&payment.id, PaymentStatus::Completed)
            .await
            .unwrap());
        let fetched = db.get_payment(&payment.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PaymentStatus::Completed);

        let for_client = db.list_payments_for_user("c1").await.unwrap();
        let for_creative = db.list_payments_for_user("cr1").await.unwrap();
        assert_eq!(for_client.len(), 1);
        assert_eq!(for_creative.len(), 1);
    }

    #[tokio::test]
    async fn customer_mapping_upsert() {
        let (_dir, db) = test_db().await;
        db.upsert_customer("u1", "cus_1").await.unwrap();
        assert_eq!(
            db.get_user_by_customer("cus_1").await.unwrap().as_deref(),
            Some("u1")
        );

        // 重复 upsert 换绑 customer id
        db.upsert_customer("u1", "cus_2").await.unwrap();
        assert_eq!(
            db.get_customer_for_user("u1").await.unwrap().as_deref(),
            Some("cus_2")
        );
        assert!(db.get_user_by_customer("cus_1").await.unwrap().is_none());
    }
}
