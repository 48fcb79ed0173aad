use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::gigs::{CreateGigPayload, Gig, GigFilter, GigStatus, GigStore, UpdateGigPayload};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, parse_iso8601_opt, to_iso8601};

const GIG_COLUMNS: &str = "id, client_id, title, description, category, budget, currency, \
                           deadline, status, featured, created_at, updated_at";

struct GigRow {
    gig: Gig,
    deadline_raw: Option<String>,
    created_raw: String,
    updated_raw: String,
}

fn gig_from_row(row: &Row<'_>) -> rusqlite::Result<GigRow> {
    let status_raw: String = row.get(8)?;
    Ok(GigRow {
        gig: Gig {
            id: row.get(0)?,
            client_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            budget: row.get(5)?,
            currency: row.get(6)?,
            deadline: None,
            status: GigStatus::parse(&status_raw).unwrap_or(GigStatus::Open),
            featured: row.get::<_, i64>(9)? != 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        deadline_raw: row.get(7)?,
        created_raw: row.get(10)?,
        updated_raw: row.get(11)?,
    })
}

fn finish_gig(parts: GigRow) -> Result<Gig, AppError> {
    let mut gig = parts.gig;
    gig.deadline = parse_iso8601_opt(parts.deadline_raw)?;
    gig.created_at = parse_iso8601(&parts.created_raw)?;
    gig.updated_at = parse_iso8601(&parts.updated_raw)?;
    Ok(gig)
}

#[async_trait]
impl GigStore for Database {
    async fn create_gig(
        &self,
        client_id: &str,
        payload: CreateGigPayload,
    ) -> Result<Gig, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO gigs (id, client_id, title, description, category, budget, currency,
                               deadline, status, featured, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'open', 0, ?9, ?9)",
            (
                &id,
                client_id,
                &payload.title,
                &payload.description,
                &payload.category,
                payload.budget,
                &payload.currency,
                payload.deadline.as_ref().map(to_iso8601),
                to_iso8601(&now),
            ),
        )?;

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
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM gigs WHERE id = ?1", GIG_COLUMNS),
                [id],
                gig_from_row,
            )
            .optional()?;
        parts.map(finish_gig).transpose()
    }

    async fn list_gigs(&self, filter: GigFilter) -> Result<Vec<Gig>, AppError> {
        let mut sql = format!("SELECT {} FROM gigs WHERE 1=1", GIG_COLUMNS);
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(category) = filter.category {
            params.push(SqlValue::Text(category));
            sql.push_str(&format!(" AND category = ?{}", params.len()));
        }
        if let Some(min) = filter.min_budget {
            params.push(SqlValue::Real(min));
            sql.push_str(&format!(" AND budget >= ?{}", params.len()));
        }
        if let Some(max) = filter.max_budget {
            params.push(SqlValue::Real(max));
            sql.push_str(&format!(" AND budget <= ?{}", params.len()));
        }
        if let Some(needle) = filter.needle {
            params.push(SqlValue::Text(format!("%{}%", needle)));
            let idx = params.len();
            sql.push_str(&format!(
                " AND (title LIKE ?{idx} OR description LIKE ?{idx})"
            ));
        }
        if let Some(status) = filter.status {
            params.push(SqlValue::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY featured DESC, created_at DESC");

        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), gig_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_gig(row?)?);
        }
        Ok(out)
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

        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE gigs SET title = ?2, description = ?3, category = ?4, budget = ?5,
                             deadline = ?6, status = ?7, updated_at = ?8
             WHERE id = ?1",
            (
                &gig.id,
                &gig.title,
                &gig.description,
                &gig.category,
                gig.budget,
                gig.deadline.as_ref().map(to_iso8601),
                gig.status.as_str(),
                to_iso8601(&gig.updated_at),
            ),
        )?;

        Ok(Some(gig))
    }

    async fn set_gig_status(&self, id: &str, status: GigStatus) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE gigs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            (id, status.as_str(), to_iso8601(&Utc::now())),
        )?;
        Ok(affected > 0)
    }

    async fn set_gig_featured(&self, id: &str, featured: bool) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE gigs SET featured = ?2, updated_at = ?3 WHERE id = ?1",
            (id, featured as i64, to_iso8601(&Utc::now())),
        )?;
        Ok(affected > 0)
    }

    async fn delete_gig(&self, id: &str) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute("DELETE FROM gigs WHERE id = ?1", [id])?;
        Ok(affected > 0)
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

    fn gig_payload(title: &str, category: &str, budget: f64) -> CreateGigPayload {
        CreateGigPayload {
            title: title.into(),
            description: format!("{} description", title),
            category: category.into(),
            budget,
            currency: "usd".into(),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn discovery_filters_compose() {
        let (_dir, db) = test_db().await;
        db.create_gig("c1", gig_payload("Logo design", "design", 300.0))
            .await
            .unwrap();
        db.create_gig("c1", gig_payload("Rust backend", "engineering", 5000.0))
            .await
            .unwrap();
        db.create_gig("c2", gig_payload("Brand redesign", "design", 1200.0))
            .await
            .unwrap();

        let design = db
            .list_gigs(GigFilter {
                category: Some("design".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(design.len(), 2);

        let pricey_design = db
            .list_gigs(GigFilter {
                category: Some("design".into()),
                min_budget: Some(1000.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pricey_design.len(), 1);
        assert_eq!(pricey_design[0].title, "Brand redesign");

        let needle = db
            .list_gigs(GigFilter {
                needle: Some("backend".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(needle.len(), 1);
        assert_eq!(needle[0].title, "Rust backend");
    }

    #[tokio::test]
    async fn featured_gigs_sort_first() {
        let (_dir, db) = test_db().await;
        let a = db
            .create_gig("c1", gig_payload("First", "misc", 10.0))
            .await
            .unwrap();
        let b = db
            .create_gig("c1", gig_payload("Second", "misc", 10.0))
            .await
            .unwrap();
        assert!(db.set_gig_featured(&a.id, true).await.unwrap());

        let all = db.list_gigs(GigFilter::default()).await.unwrap();
        assert_eq!(all[0].id, a.id);
        assert!(all.iter().any(|g| g.id == b.id));
    }

    #[tokio::test]
    async fn status_update_and_delete() {
        let (_dir, db) = test_db().await;
        let gig = db
            .create_gig("c1", gig_payload("Job", "misc", 10.0))
            .await
            .unwrap();
        assert!(db
            .set_gig_status(&gig.id, GigStatus::InProgress)
            .await
            .unwrap());
        let fetched = db.get_gig(&gig.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, GigStatus::InProgress);

        assert!(db.delete_gig(&gig.id).await.unwrap());
        assert!(db.get_gig(&gig.id).await.unwrap().is_none());
        assert!(!db.delete_gig(&gig.id).await.unwrap());
    }
}
