use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::reviews::{CreateReviewPayload, Review, ReviewStore};
use crate::storage::postgres_store::PgStore;

const REVIEW_COLUMNS: &str = "id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at";

fn review_from_row(row: &Row) -> Review {
    Review {
        id: row.get(0),
        gig_id: row.get(1),
        reviewer_id: row.get(2),
        reviewee_id: row.get(3),
        rating: row.get(4),
        comment: row.get(5),
        created_at: row.get(6),
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn create_review(
        &self,
        reviewer_id: &str,
        payload: CreateReviewPayload,
    ) -> Result<Review, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO reviews (id, gig_id, reviewer_id, reviewee_id, rating, comment,
                                      created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &id,
                    &payload.gig_id,
                    &reviewer_id,
                    &payload.reviewee_id,
                    &payload.rating,
                    &payload.comment,
                    &now,
                ],
            )
            .await?;

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
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM reviews WHERE gig_id = $1 AND reviewer_id = $2",
                    REVIEW_COLUMNS
                ),
                &[&gig_id, &reviewer_id],
            )
            .await?;
        Ok(row.map(|r| review_from_row(&r)))
    }

    async fn list_reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, AppError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM reviews WHERE reviewee_id = $1 ORDER BY created_at DESC",
                    REVIEW_COLUMNS
                ),
                &[&reviewee_id],
            )
            .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }
}
