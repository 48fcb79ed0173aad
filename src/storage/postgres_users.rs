use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::postgres_store::{PgStore, pg_row_opt_string};
use crate::users::{CreateUserPayload, UpdateUserPayload, User, UserRole, UserStore, hash_password};

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

fn user_from_row(row: &Row) -> User {
    let skills_raw: String = row.get(5);
    let role_raw: String = row.get(8);
    User {
        id: row.get(0),
        email: row.get(1),
        username: row.get(2),
        display_name: row.get(3),
        bio: row.get(4),
        skills: serde_json::from_str(&skills_raw).unwrap_or_default(),
        hourly_rate: row.get(6),
        avatar_url: pg_row_opt_string(row, 7),
        role: UserRole::parse(&role_raw).unwrap_or(UserRole::Client),
        password_hash: row.get(9),
        created_at: row.get(10),
        updated_at: row.get(11),
    }
}

#[async_trait]
impl UserStore for PgStore {
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

        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO users (id, email, username, display_name, bio, skills, hourly_rate,
                                    avatar_url, role, password_hash, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, '', '[]', NULL, NULL, $5, $6, $7, $7)",
                &[
                    &id,
                    &payload.email,
                    &username,
                    &display_name,
                    &payload.role.as_str(),
                    &password_hash,
                    &now,
                ],
            )
            .await?;

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
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS),
                &[&id],
            )
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS),
                &[&email],
            )
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
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
        let client = self.pool.pick();
        client
            .execute(
                "UPDATE users SET display_name = $2, bio = $3, skills = $4, hourly_rate = $5,
                                  avatar_url = $6, updated_at = $7
                 WHERE id = $1",
                &[
                    &user.id,
                    &user.display_name,
                    &user.bio,
                    &skills,
                    &user.hourly_rate,
                    &user.avatar_url,
                    &user.updated_at,
                ],
            )
            .await?;

        Ok(Some(user))
    }
}
