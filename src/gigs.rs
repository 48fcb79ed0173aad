use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GigStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl GigStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GigStatus::Open => "open",
            GigStatus::InProgress => "in_progress",
            GigStatus::Completed => "completed",
            GigStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(GigStatus::Open),
            "in_progress" => Some(GigStatus::InProgress),
            "completed" => Some(GigStatus::Completed),
            "cancelled" => Some(GigStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: f64,
    pub currency: String,
    pub deadline: Option<DateTime<Utc>>,
    pub status: GigStatus,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGigPayload {
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGigPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<GigStatus>,
}

// 发现/检索过滤条件；全部可选，AND 组合
#[derive(Debug, Clone, Default)]
pub struct GigFilter {
    pub category: Option<String>,
    pub min_budget: Option<f64>,
    pub max_budget: Option<f64>,
    pub needle: Option<String>,
    pub status: Option<GigStatus>,
}

#[async_trait]
pub trait GigStore: Send + Sync {
    async fn create_gig(&self, client_id: &str, payload: CreateGigPayload)
        -> Result<Gig, AppError>;
    async fn get_gig(&self, id: &str) -> Result<Option<Gig>, AppError>;
    async fn list_gigs(&self, filter: GigFilter) -> Result<Vec<Gig>, AppError>;
    async fn update_gig(&self, id: &str, payload: UpdateGigPayload)
        -> Result<Option<Gig>, AppError>;
    async fn set_gig_status(&self, id: &str, status: GigStatus) -> Result<bool, AppError>;
    async fn set_gig_featured(&self, id: &str, featured: bool) -> Result<bool, AppError>;
    async fn delete_gig(&self, id: &str) -> Result<bool, AppError>;
}
