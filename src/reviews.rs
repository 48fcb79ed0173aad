use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub gig_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewPayload {
    pub gig_id: String,
    pub reviewee_id: String,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn create_review(
        &self,
        reviewer_id: &str,
        payload: CreateReviewPayload,
    ) -> Result<Review, AppError>;
    async fn get_review_for_gig(
        &self,
        gig_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Review>, AppError>;
    async fn list_reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, AppError>;
}
