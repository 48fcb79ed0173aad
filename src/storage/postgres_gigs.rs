use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::error::AppError;
use crate::gigs::{CreateGigPayload, Gig, GigFilter, GigStatus, GigStore, UpdateGigPayload};
use crate::storage::postgres_store::{PgStore, pg_row_bool_or, pg_row_opt_datetime};

const GIG_COLUMNS: &str = "id, client_id, title, description, category, budget, currency, \
                           deadline, status, featured, created_at, updated_at";

fn gig_from_row(row: &Row) -> Gig {
    let status_raw: String = row.get(8);
    Gig {
        id: row.get(0),
        client_id: row.get(1),
        title: row.get(2),
        description: row.get(3),
        category: row.get(4),
        budget: row.get(5),
        currency: row.get(6),
        deadline: pg_row_opt_datetime(row, 7),
        status: GigStatus::parse(&status_raw).unwrap_or(GigStatus::Open),
        featured: pg_row_bool_or(row, 9, false),
        created_at: row.get(10),
        updated_at: row.get(11),
    }
}

#[async_trait]
impl GigStore for PgStore {
    async fn create_gig(
        &self,
        client_id: &str,
        payload: CreateGigPayload,
    ) -> Result<Gig, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO gigs (id, client_id, title, description, category, budget, currency,
                                   deadline, status, featured, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'open', FALSE, $9, $9)",
                &[
                    &id,
                    &client_id,
                    &payload.title,
                    &payload.description,
                    &payload.category,
                    &payload.budget,
                    &payload.currency,
                    &payload.deadline,
                    &now,
                ],
            )
            .await?;

        Ok(Gig {
            id,
            client_id: client_id.to_string(),
            title: payload.title,
            description: payload.description,
            category: payload.category,
            budget: payload.budget,
            currency: payload.currency,
            deadline: payload.deadline,
            status: GigStatus::Open,
            featured: false,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_gig(&self, id: &str) -> Result<Option<Gig>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM gigs WHERE id = $1", GIG_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| gig_from_row(&r)))
    }

    async fn list_gigs(&self, filter: GigFilter) -> Result<Vec<Gig>, AppError> {
        let mut sql = format!("SELECT {} FROM gigs WHERE TRUE", GIG_COLUMNS);
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();

        if let Some(category) = filter.category {
            params.push(Box::new(category));
            sql.push_str(&format!(" AND category = ${}", params.len()));
        }
        if let Some(min) = filter.min_budget {
            params.push(Box::new(min));
            sql.push_str(&format!(" AND budget >= ${}", params.len()));
        }
        if let Some(max) = filter.max_budget {
            params.push(Box::new(max));
            sql.push_str(&format!(" AND budget <= ${}", params.len()));
        }
        if let Some(needle) = filter.needle {
            params.push(Box::new(format!("%{}%", needle)));
            let idx = params.len();
            sql.push_str(&format!(
                " AND (title ILIKE ${idx} OR description ILIKE ${idx})"
            ));
        }
        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ${}", params.len()));
        }
        sql.push_str(" ORDER BY featured DESC, created_at DESC");

        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let client = self.pool.pick();
        let rows = client.query(&sql, &refs).await?;
        Ok(rows.iter().map(gig_from_row).collect())
    }

    async fn update_gig(
        &self,
        id: &str,
        payload: UpdateGigPayload,
    ) -> Result<Option<Gig>, AppError> {
        let Some(mut gig) = self.get_gig(id).await? else {
            return Ok(None);
        };

        if let Some(v) = payload.title {
            gig.title = v;
        }
        if let Some(v) = payload.description {
            gig.description = v;
        }
        if let Some(v) = payload.category {
            gig.category = v;
        }
        if let Some(v) = payload.budget {
            gig.budget = v;
        }
        if let Some(v) = payload.deadline {
            gig.deadline = Some(v);
        }
        if let Some(v) = payload.status {
            gig.status = v;
        }
        gig.updated_at = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "UPDATE gigs SET title = $2, description = $3, category = $4, budget = $5,
                                 deadline = $6, status = $7, updated_at = $8
                 WHERE id = $1",
                &[
                    &gig.id,
                    &gig.title,
                    &gig.description,
                    &gig.category,
                    &gig.budget,
                    &gig.deadline,
                    &gig.status.as_str(),
                    &gig.updated_at,
                ],
            )
            .await?;

        Ok(Some(gig))
    }

    async fn set_gig_status(&self, id: &str, status: GigStatus) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE gigs SET status = $2, updated_at = $3 WHERE id = $1",
                &[&id, &status.as_str(), &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn set_gig_featured(&self, id: &str, featured: bool) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute(
                "UPDATE gigs SET featured = $2, updated_at = $3 WHERE id = $1",
                &[&id, &featured, &Utc::now()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete_gig(&self, id: &str) -> Result<bool, AppError> {
        let client = self.pool.pick();
        let affected = client
            .execute("DELETE FROM gigs WHERE id = $1", &[&id])
            .await?;
        Ok(affected > 0)
    }
}
