use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::payments::{
    CustomerMapping, CustomerStore, NewPayment, Payment, PaymentStatus, PaymentStore, PaymentType,
};
use crate::storage::postgres_store::{PgStore, pg_row_opt_string};

const PAYMENT_COLUMNS: &str = "id, gig_id, client_id, creative_id, amount, currency, status, \
                               payment_type, processor_intent_id, processor_customer_id, \
                               created_at, updated_at";

fn payment_from_row(row: &Row) -> Payment {
    let status_raw: String = row.get(6);
    let type_raw: String = row.get(7);
    Payment {
        id: row.get(0),
        gig_id: pg_row_opt_string(row, 1),
        client_id: row.get(2),
        creative_id: pg_row_opt_string(row, 3),
        amount: row.get(4),
        currency: row.get(5),
        status: PaymentStatus::parse(&status_raw).unwrap_or(PaymentStatus::Pending),
        payment_type: PaymentType::parse(&type_raw).unwrap_or(PaymentType::Final),
        processor_intent_id: pg_row_opt_string(row, 8),
        processor_customer_id: pg_row_opt_string(row, 9),
        created_at: row.get(10),
        updated_at: row.get(11),
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create_payment(&self, new: NewPayment) -> Result<Payment, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO payments (id, gig_id, client_id, creative_id, amount, currency,
                                       status, payment_type, processor_intent_id,
                                       processor_customer_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
                &[
                    &id,
                    &new.gig_id,
                    &new.client_id,
                    &new.creative_id,
                    &new.amount,
                    &new.currency,
                    &new.status.as_str(),
                    &new.payment_type.as_str(),
                    &new.processor_intent_id,
                    &new.processor_customer_id,
                    &now,
                ],
            )
            .await?;

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
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| payment_from_row(&r)))
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM payments WHERE processor_intent_id = $1",
                    PAYMENT_COLUMNS
                ),
                &[&intent_id],
            )
            .await?;
        Ok(row.map(|r| payment_from_row(&r)))
    }

    async fn list_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM payments
                     WHERE client_id = $1 OR creative_id = $1
                     ORDER BY created_at DESC",
                    PAYMENT_COLUMNS
                ),
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(payment_from_row).collect())
    }

    async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1",
                &[&id, &status.as_str(), &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn upsert_customer(
        &self,
        user_id: &str,
        processor_customer_id: &str,
    ) -> Result<CustomerMapping, AppError> {
        let now = Utc::now();
        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO customers (user_id, processor_customer_id, created_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (user_id) DO UPDATE SET processor_customer_id = EXCLUDED.processor_customer_id",
                &[&user_id, &processor_customer_id, &now],
            )
            .await?;
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
        let client = self.pool.pick();
        let row = client
            .query_opt(
                "SELECT user_id FROM customers WHERE processor_customer_id = $1",
                &[&processor_customer_id],
            )
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn get_customer_for_user(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                "SELECT processor_customer_id FROM customers WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.map(|r| r.get(0)))
    }
}
