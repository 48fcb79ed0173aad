use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl MilestoneStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Processing => "processing",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MilestoneStatus::Pending),
            "processing" => Some(MilestoneStatus::Processing),
            "completed" => Some(MilestoneStatus::Completed),
            "failed" => Some(MilestoneStatus::Failed),
            _ => None,
        }
    }

    // pending → processing → {completed | failed}；completed 不可回退
    pub fn can_transition(self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub gig_id: String,
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub due_date: Option<DateTime<Utc>>,
    pub status: MilestoneStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilestonePayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MilestoneStore: Send + Sync {
    async fn create_milestone(
        &self,
        gig_id: &str,
        payload: CreateMilestonePayload,
    ) -> Result<Milestone, AppError>;
    async fn get_milestone(&self, id: &str) -> Result<Option<Milestone>, AppError>;
    async fn get_milestone_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Milestone>, AppError>;
    async fn list_milestones_for_gig(&self, gig_id: &str) -> Result<Vec<Milestone>, AppError>;
    async fn set_milestone_status(
        &self,
        id: &str,
        status: MilestoneStatus,
        payment_id: Option<String>,
    ) -> Result<bool, AppError>;
}
