use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredThread {
    pub id: Uuid,
    pub focus_id: Uuid,
    pub created_by: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Assistant replies carry their suggested tasks here.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn thread_from_row(row: &tokio_postgres::Row) -> StoredThread {
    StoredThread {
        id: row.get("id"),
        focus_id: row.get("focus_id"),
        created_by: row.get("created_by"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &tokio_postgres::Row) -> Result<StoredMessage> {
    let role_raw: String = row.get("role");

    Ok(StoredMessage {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        role: MessageRole::parse(&role_raw)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown message role {:?}", role_raw)))?,
        content: row.get("content"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

pub async fn insert_thread(
    pool: &PgPool,
    focus_id: &Uuid,
    created_by: i64,
    title: Option<&str>,
) -> Result<StoredThread> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();

    let row = client
        .query_one(
            "INSERT INTO assistant_threads (id, focus_id, created_by, title)
             VALUES ($1, $2, $3, $4)
             RETURNING id, focus_id, created_by, title, created_at, updated_at",
            &[&id, focus_id, &created_by, &title],
        )
        .await?;

    Ok(thread_from_row(&row))
}

pub async fn get_thread(pool: &PgPool, id: &Uuid) -> Result<StoredThread> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, focus_id, created_by, title, created_at, updated_at
             FROM assistant_threads WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("thread {}", id)))?;

    Ok(thread_from_row(&row))
}

pub async fn list_threads(pool: &PgPool, focus_id: &Uuid) -> Result<Vec<StoredThread>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, focus_id, created_by, title, created_at, updated_at
             FROM assistant_threads WHERE focus_id = $1
             ORDER BY updated_at DESC",
            &[focus_id],
        )
        .await?;

    Ok(rows.iter().map(thread_from_row).collect())
}

/// Appends a message and bumps the thread's `updated_at` in one transaction.
pub async fn insert_message(
    pool: &PgPool,
    thread_id: &Uuid,
    role: MessageRole,
    content: &str,
    metadata: Option<serde_json::Value>,
) -> Result<StoredMessage> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;
    let id = Uuid::new_v4();

    let row = tx
        .query_one(
            "INSERT INTO assistant_messages (id, thread_id, role, content, metadata)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, thread_id, role, content, metadata, created_at",
            &[&id, thread_id, &role.as_str(), &content, &metadata],
        )
        .await?;

    tx.execute(
        "UPDATE assistant_threads SET updated_at = NOW() WHERE id = $1",
        &[thread_id],
    )
    .await?;

    tx.commit().await?;

    message_from_row(&row)
}

/// The last `limit` messages of a thread, oldest first.
pub async fn list_messages(pool: &PgPool, thread_id: &Uuid, limit: i64) -> Result<Vec<StoredMessage>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, thread_id, role, content, metadata, created_at
             FROM assistant_messages WHERE thread_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
            &[thread_id, &limit],
        )
        .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows.iter().rev() {
        messages.push(message_from_row(row)?);
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::parse("tool"), None);
    }
}
