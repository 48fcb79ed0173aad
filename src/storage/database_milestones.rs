use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::milestones::{
    CreateMilestonePayload, Milestone, MilestoneStatus, MilestoneStore,
};
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, parse_iso8601_opt, to_iso8601};

const MILESTONE_COLUMNS: &str = "id, gig_id, title, description, amount, due_date, status, \
                                 payment_id, created_at, updated_at";

struct MilestoneRow {
    milestone: Milestone,
    due_raw: Option<String>,
    created_raw: String,
    updated_raw: String,
}

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<MilestoneRow> {
    let status_raw: String = row.get(6)?;
    Ok(MilestoneRow {
        milestone: Milestone {
            id: row.get(0)?,
            gig_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            amount: row.get(4)?,
            due_date: None,
            status: MilestoneStatus::parse(&status_raw).unwrap_or(MilestoneStatus::Pending),
            payment_id: row.get(7)?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        due_raw: row.get(5)?,
        created_raw: row.get(8)?,
        updated_raw: row.get(9)?,
    })
}

fn finish_milestone(parts: MilestoneRow) -> Result<Milestone, AppError> {
    let mut ms = parts.milestone;
    ms.due_date = parse_iso8601_opt(parts.due_raw)?;
    ms.created_at = parse_iso8601(&parts.created_raw)?;
    ms.updated_at = parse_iso8601(&parts.updated_raw)?;
    Ok(ms)
}

#[async_trait]
impl MilestoneStore for Database {
    async fn create_milestone(
        &self,
        gig_id: &str,
        payload: CreateMilestonePayload,
    ) -> Result<Milestone, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO milestones (id, gig_id, title, description, amount, due_date,
                                     status, payment_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', NULL, ?7, ?7)",
            (
                &id,
                gig_id,
                &payload.title,
                &payload.description,
                payload.amount,
                payload.due_date.as_ref().map(to_iso8601),
                to_iso8601(&now),
            ),
        )?;

        Ok(Milestone {
            id,
            gig_id: gig_id.to_string(),
            title: payload.title,
            description: payload.description,
            amount: payload.amount,
            due_date: payload.due_date,
            status: MilestoneStatus::Pending,
            payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_milestone(&self, id: &str) -> Result<Option<Milestone>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM milestones WHERE id = ?1", MILESTONE_COLUMNS),
                [id],
                milestone_from_row,
            )
            .optional()?;
        parts.map(finish_milestone).transpose()
    }

    async fn get_milestone_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Milestone>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!(
                    "SELECT {} FROM milestones WHERE payment_id = ?1",
                    MILESTONE_COLUMNS
                ),
                [payment_id],
                milestone_from_row,
            )
            .optional()?;
        parts.map(finish_milestone).transpose()
    }

    async fn list_milestones_for_gig(&self, gig_id: &str) -> Result<Vec<Milestone>, AppError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM milestones WHERE gig_id = ?1 ORDER BY created_at ASC",
            MILESTONE_COLUMNS
        ))?;
        let rows = stmt.query_map([gig_id], milestone_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_milestone(row?)?);
        }
        Ok(out)
    }

    async fn set_milestone_status(
        &self,
        id: &str,
        status: MilestoneStatus,
        payment_id: Option<String>,
    ) -> Result<bool, AppError> {
        let conn = self.connection.lock().await;
        let affected = conn.execute(
            "UPDATE milestones SET status = ?2,
                                   payment_id = COALESCE(?3, payment_id),
                                   updated_at = ?4
             WHERE id = ?1",
            (
                id,
                status.as_str(),
                payment_id,
                to_iso8601(&Utc::now()),
            ),
        )?;
        Ok(affected > 0)
    }
}
