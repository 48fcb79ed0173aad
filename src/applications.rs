use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApplicationStatus::Pending),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            "withdrawn" => Some(ApplicationStatus::Withdrawn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub gig_id: String,
    pub creative_id: String,
    pub cover_letter: String,
    pub proposed_rate: Option<f64>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationPayload {
    pub cover_letter: String,
    #[serde(default)]
    pub proposed_rate: Option<f64>,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create_application(
        &self,
        gig_id: &str,
        creative_id: &str,
        payload: CreateApplicationPayload,
    ) -> Result<Application, AppError>;
    async fn get_application(&self, id: &str) -> Result<Option<Application>, AppError>;
    async fn get_application_for_gig(
        &self,
        gig_id: &str,
        creative_id: &str,
    ) -> Result<Option<Application>, AppError>;
    async fn list_applications_for_gig(&self, gig_id: &str) -> Result<Vec<Application>, AppError>;
    async fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<bool, AppError>;
    // 接受一份申请时，同一 gig 下其余 pending 申请整体转为 rejected
    async fn reject_other_pending(&self, gig_id: &str, accepted_id: &str)
        -> Result<u64, AppError>;
}
