use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::TelegramUser;
use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

#[derive(Clone, Debug, Serialize)]
pub struct StoredUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

fn user_from_row(row: &tokio_postgres::Row) -> StoredUser {
    StoredUser {
        id: row.get("id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        language_code: row.get("language_code"),
        created_at: row.get("created_at"),
        last_seen_at: row.get("last_seen_at"),
    }
}

/// Inserts or refreshes the user's Telegram profile. Runs on every
/// authenticated request, so it also bumps `last_seen_at`.
pub async fn upsert_user(pool: &PgPool, user: &TelegramUser) -> Result<StoredUser> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "INSERT INTO users (id, username, first_name, last_name, language_code)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                language_code = EXCLUDED.language_code,
                last_seen_at = NOW()
             RETURNING id, username, first_name, last_name, language_code, created_at, last_seen_at",
            &[
                &user.id,
                &user.username,
                &user.first_name,
                &user.last_name,
                &user.language_code,
            ],
        )
        .await?;

    Ok(user_from_row(&row))
}

pub async fn get_user(pool: &PgPool, id: i64) -> Result<StoredUser> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, username, first_name, last_name, language_code, created_at, last_seen_at
             FROM users WHERE id = $1",
            &[&id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("user {}", id)))?;

    Ok(user_from_row(&row))
}
