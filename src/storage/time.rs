use chrono::{DateTime, Utc};

use crate::error::AppError;

pub fn to_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid stored timestamp `{}`: {}", s, e)))
}

pub fn parse_iso8601_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    s.map(|raw| parse_iso8601(&raw)).transpose()
}
