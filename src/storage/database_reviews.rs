use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::reviews::{CreateReviewPayload, Review, ReviewStore};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, to_iso8601};

const REVIEW_COLUMNS: &str =
    "id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<(Review, String)> {
    Ok((
        Review {
            id: row.get(0)?,
            gig_id: row.get(1)?,
            reviewer_id: row.get(2)?,
            reviewee_id: row.get(3)?,
            rating: row.get(4)?,
            comment: row.get(5)?,
            created_at: Utc::now(),
        },
        row.get(6)?,
    ))
}

fn finish_review(parts: (Review, String)) -> Result<Review, AppError> {
    let (mut review, created_raw) = parts;
    review.created_at = parse_iso8601(&created_raw)?;
    Ok(review)
}

#[async_trait]
impl ReviewStore for Database {
    async fn create_review(
        &self,
        reviewer_id: &str,
        payload: CreateReviewPayload,
    ) -> Result<Review, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO reviews (id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                &id,
                &payload.gig_id,
                reviewer_id,
                &payload.reviewee_id,
                payload.rating,
                &payload.comment,
                to_iso8601(&now),
            ),
        )?;

        Ok(Review {
            id,
            gig_id: payload.gig_id,
            reviewer_id: reviewer_id.to_string(),
            reviewee_id: payload.reviewee_id,
            rating: payload.rating,
            comment: payload.comment,
            created_at: now,
        })
    }

    async fn get_review_for_gig(
        &self,
        gig_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Review>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reviews WHERE gig_id = ?1 AND reviewer_id = ?2",
                    REVIEW_COLUMNS
                ),
                [gig_id, reviewer_id],
                review_from_row,
            )
            .optional()?;
        parts.map(finish_review).transpose()
    }

    async fn list_reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE reviewee_id = ?1 ORDER BY created_at DESC",
            REVIEW_COLUMNS
        ))?;
        let rows = stmt.query_map([reviewee_id], review_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_review(row?)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn review_crud_and_duplicate_guard() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();

        let payload = CreateReviewPayload {
            gig_id: "g1".into(),
            reviewee_id: "cr1".into(),
            rating: 5,
            comment: "great work".into(),
        };
        db.create_review("c1", payload.clone()).await.unwrap();

        let found = db.get_review_for_gig("g1", "c1").await.unwrap().unwrap();
        assert_eq!(found.rating, 5);

        let listed = db.list_reviews_for_user("cr1").await.unwrap();
        assert_eq!(listed.len(), 1);

        // 同一 gig 同一评价人只允许一条
        assert!(db.create_review("c1", payload).await.is_err());
    }
}
