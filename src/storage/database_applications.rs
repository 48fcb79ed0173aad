use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::applications::{
    Application, ApplicationStatus, ApplicationStore, CreateApplicationPayload,
};
use crate::error::AppError;
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, to_iso8601};

const APP_COLUMNS: &str =
    "id, gig_id, creative_id, cover_letter, proposed_rate, status, created_at, updated_at";

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<(Application, String, String)> {
    let status_raw: String = row.get(5)?;
    Ok((
        Application {
            id: row.get(0)?,
            gig_id: row.get(1)?,
            creative_id: row.get(2)?,
            cover_letter: row.get(3)?,
            proposed_rate: row.get(4)?,
            status: ApplicationStatus::parse(&status_raw).unwrap_or(ApplicationStatus::Pending),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get(6)?,
        row.get(7)?,
    ))
}

fn finish_application(parts: (Application, String, String)) -> Result<Application, AppError> {
    let (mut app, created_raw, updated_raw) = parts;
    app.created_at = parse_iso8601(&created_raw)?;
    app.updated_at = parse_iso8601(&updated_raw)?;
    Ok(app)
}

#[async_trait]
impl ApplicationStore for Database {
    async fn create_application(
        &self,
        gig_id: &str,
        creative_id: &str,
        payload: CreateApplicationPayload,
    ) -> Result<Application, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO applications (id, gig_id, creative_id, cover_letter, proposed_rate,
                                       status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
            (
                &id,
                gig_id,
                creative_id,
                &payload.cover_letter,
                payload.proposed_rate,
                to_iso8601(&now),
            ),
        )?;

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
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM applications WHERE id = ?1", APP_COLUMNS),
                [id],
                application_from_row,
            )
            .optional()?;
        parts.map(finish_application).transpose()
    }

    async fn get_application_for_gig(
        &self,
        gig_id: &str,
        creative_id: &str,
    ) -> Result<Option<Application>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!(
                    "SELECT {} FROM applications WHERE gig_id = ?1 AND creative_id = ?2",
                    APP_COLUMNS
                ),
                [gig_id, creative_id],
                application_from_row,
            )
            .optional()?;
        parts.map(finish_application).transpose()
    }

    async fn list_applications_for_gig(&self, gig_id: &str) -> Result<Vec<Application>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM applications WHERE gig_id = ?1 ORDER BY created_at ASC",
            APP_COLUMNS
        ))?;
        let rows = stmt.query_map([gig_id], application_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_application(row?)?);
        }
        Ok(out)
    }

    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE applications SET status = ?2, updated_at = ?3 WHERE id = ?1",
            (id, status.as_str(), to_iso8601(&Utc::now())),
        )?;
        Ok(affected > 0)
    }

    async fn reject_other_pending(
        &self,
        gig_id: &str,
        accepted_id: &str,
    ) -> Result<u64, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE applications SET status = 'rejected', updated_at = ?3
             WHERE gig_id = ?1 AND id != ?2 AND status = 'pending'",
            (gig_id, accepted_id, to_iso8601(&Utc::now())),
        )?;
        Ok(affected as u64)
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

    fn payload() -> CreateApplicationPayload {
        CreateApplicationPayload {
            cover_letter: "pick me".into(),
            proposed_rate: Some(50.0),
        }
    }

    #[tokio::test]
    async fn apply_and_lookup() {
        let (_dir, db) = test_db().await;
        let app = db.create_application("g1", "cr1", payload()).await.unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);

        let by_pair = db
            .get_application_for_gig("g1", "cr1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_pair.id, app.id);
        assert!(db
            .get_application_for_gig("g1", "cr2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_application_rejected_by_constraint() {
        let (_dir, db) = test_db().await;
        db.create_application("g1", "cr1", payload()).await.unwrap();
        assert!(db.create_application("g1", "cr1", payload()).await.is_err());
    }

    #[tokio::test]
    async fn accepting_rejects_competitors() {
        let (_dir, db) = test_db().await;
        let winner = db.create_application("g1", "cr1", payload()).await.unwrap();
        db.create_application("g1", "cr2", payload()).await.unwrap();
        db.create_application("g1", "cr3", payload()).await.unwrap();

        assert!(db
            .set_application_status(&winner.id, ApplicationStatus::Accepted)
            .await
            .unwrap());
        let rejected = db.reject_other_pending("g1", &winner.id).await.unwrap();
        assert_eq!(rejected, 2);

        let apps = db.list_applications_for_gig("g1").await.unwrap();
        assert_eq!(apps.len(), 3);
        for app in apps {
            if app.id == winner.id {
                assert_eq!(app.status, ApplicationStatus::Accepted);
            } else {
                assert_eq!(app.status, ApplicationStatus::Rejected);
            }
        }
    }
}
