use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

pub const KIND_TASK_DUE_SOON: &str = "task_due_soon";
pub const KIND_TASK_OVERDUE: &str = "task_overdue";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Queued => "queued",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(NotificationStatus::Queued),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredNotification {
    pub id: Uuid,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

fn notification_from_row(row: &tokio_postgres::Row) -> Result<StoredNotification> {
    let status_raw: String = row.get("status");

    Ok(StoredNotification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: row.get("kind"),
        message: row.get("message"),
        status: NotificationStatus::parse(&status_raw).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown notification status {:?}", status_raw))
        })?,
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        dedup_key: row.get("dedup_key"),
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
    })
}

/// Queues a notification for delivery. A duplicate `dedup_key` is silently
/// skipped; returns whether a row was actually inserted.
pub async fn enqueue(
    pool: &PgPool,
    user_id: i64,
    kind: &str,
    message: &str,
    dedup_key: Option<&str>,
) -> Result<bool> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();

    let rows_affected = client
        .execute(
            "INSERT INTO notification_log (id, user_id, kind, message, dedup_key)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (dedup_key) DO NOTHING",
            &[&id, &user_id, &kind, &message, &dedup_key],
        )
        .await?;

    Ok(rows_affected > 0)
}

/// Claims up to `limit` queued notifications for delivery, oldest first.
/// The attempt counter is bumped at claim time, so a worker crash leaves the
/// row queued and retryable with the attempt recorded.
pub async fn claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<StoredNotification>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "UPDATE notification_log SET attempts = attempts + 1
             WHERE id IN (
                 SELECT id FROM notification_log
                 WHERE status = 'queued'
                 ORDER BY created_at ASC
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, user_id, kind, message, status, attempts, last_error,
                       dedup_key, created_at, sent_at",
            &[&limit],
        )
        .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for row in &rows {
        notifications.push(notification_from_row(row)?);
    }

    Ok(notifications)
}

pub async fn mark_sent(pool: &PgPool, id: &Uuid) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE notification_log SET status = 'sent', sent_at = NOW(), last_error = NULL
             WHERE id = $1",
            &[id],
        )
        .await?;

    Ok(())
}

/// Records a delivery failure. Below the attempt cap the row goes back to
/// the queue; at the cap it is marked failed.
pub async fn mark_failure(pool: &PgPool, id: &Uuid, error: &str, max_attempts: i32) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE notification_log
             SET status = CASE WHEN attempts >= $3 THEN 'failed' ELSE 'queued' END,
                 last_error = $2
             WHERE id = $1",
            &[id, &error, &max_attempts],
        )
        .await?;

    Ok(())
}

pub async fn list_for_user(pool: &PgPool, user_id: i64, limit: i64) -> Result<Vec<StoredNotification>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, user_id, kind, message, status, attempts, last_error,
                    dedup_key, created_at, sent_at
             FROM notification_log
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
            &[&user_id, &limit],
        )
        .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for row in &rows {
        notifications.push(notification_from_row(row)?);
    }

    Ok(notifications)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            NotificationStatus::Queued,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(NotificationStatus::parse("pending"), None);
    }
}
