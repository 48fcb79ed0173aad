use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::database::Database;
use crate::storage::time::{parse_iso8601, to_iso8601};
use crate::users::{CreateUserPayload, UpdateUserPayload, User, UserStore, hash_password};

const USER_COLUMNS: &str = "id, email, username, display_name, bio, skills, hourly_rate, \
                            avatar_url, role, password_hash, created_at, updated_at";

fn default_username_from_email(email: &str) -> String {
    let base = email
        .split('@')
        .next()
        .unwrap_or("user")
        .trim()
        .to_lowercase();
    if base.is_empty() { "user".to_string() } else { base }
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<(User, String, String)> {
    let skills_raw: String = row.get(5)?;
    let role_raw: String = row.get(8)?;
    let created_raw: String = row.get(10)?;
    let updated_raw: String = row.get(11)?;
    let user = User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        skills: serde_json::from_str(&skills_raw).unwrap_or_default(),
        hourly_rate: row.get(6)?,
        avatar_url: row.get(7)?,
        role: crate::users::UserRole::parse(&role_raw).unwrap_or(crate::users::UserRole::Client),
        password_hash: row.get(9)?,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    Ok((user, created_raw, updated_raw))
}

fn finish_user(parts: (User, String, String)) -> Result<User, AppError> {
    let (mut user, created_raw, updated_raw) = parts;
    user.created_at = parse_iso8601(&created_raw)?;
    user.updated_at = parse_iso8601(&updated_raw)?;
    Ok(user)
}

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, payload: CreateUserPayload) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let username = payload
            .username
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_username_from_email(&payload.email));
        let display_name = payload
            .display_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| username.clone());
        let password_hash = hash_password(&payload.password)?;

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO users (id, email, username, display_name, bio, skills, hourly_rate,
                                avatar_url, role, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, '', '[]', NULL, NULL, ?5, ?6, ?7, ?7)",
            (
                &id,
                &payload.email,
                &username,
                &display_name,
                payload.role.as_str(),
                &password_hash,
                to_iso8601(&now),
            ),
        )?;

        Ok(User {
            id,
            email: payload.email,
            username,
            display_name,
            bio: String::new(),
            skills: Vec::new(),
            hourly_rate: None,
            avatar_url: None,
            role: payload.role,
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                user_from_row,
            )
            .optional()?;
        parts.map(finish_user).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let conn = self.connection.lock().await;
        let parts = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                [email],
                user_from_row,
            )
            .optional()?;
        parts.map(finish_user).transpose()
    }

    async fn update_user(
        &self,
        id: &str,
        payload: UpdateUserPayload,
    ) -> Result<Option<User>, AppError> {
        let Some(mut user) = self.get_user(id).await? else {
            return Ok(None);
        };

        if let Some(v) = payload.display_name {
            user.display_name = v;
        }
        if let Some(v) = payload.bio {
            user.bio = v;
        }
        if let Some(v) = payload.skills {
            user.skills = v;
        }
        if let Some(v) = payload.hourly_rate {
            user.hourly_rate = Some(v);
        }
        if let Some(v) = payload.avatar_url {
            user.avatar_url = Some(v);
        }
        user.updated_at = Utc::now();

        let skills = serde_json::to_string(&user.skills)?;
        let conn = self.connection.lock().await;
        conn.execute(
            "UPDATE users SET display_name = ?2, bio = ?3, skills = ?4, hourly_rate = ?5,
                              avatar_url = ?6, updated_at = ?7
             WHERE id = ?1",
            (
                &user.id,
                &user.display_name,
                &user.bio,
                &skills,
                user.hourly_rate,
                &user.avatar_url,
                to_iso8601(&user.updated_at),
            ),
        )?;

        Ok(Some(user))
    }
}
