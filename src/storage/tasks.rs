use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

pub const TASK_TITLE_MAX: usize = 300;
pub const TASK_DESCRIPTION_MAX: usize = 4000;
pub const COMMENT_BODY_MAX: usize = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredTask {
    pub id: Uuid,
    pub focus_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<i64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredSubtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub done: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A task picked up by the daily reminder scans. Unassigned tasks fall back
/// to the focus owner as the recipient.
#[derive(Clone, Debug)]
pub struct ReminderTask {
    pub task_id: Uuid,
    pub title: String,
    pub focus_title: String,
    pub due_at: DateTime<Utc>,
    pub notify_user_id: i64,
}

fn task_from_row(row: &tokio_postgres::Row) -> Result<StoredTask> {
    let priority_raw: String = row.get("priority");
    let status_raw: String = row.get("status");

    Ok(StoredTask {
        id: row.get("id"),
        focus_id: row.get("focus_id"),
        title: row.get("title"),
        description: row.get("description"),
        priority: TaskPriority::parse(&priority_raw)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown priority {:?}", priority_raw)))?,
        status: TaskStatus::parse(&status_raw)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown status {:?}", status_raw)))?,
        due_at: row.get("due_at"),
        assignee_id: row.get("assignee_id"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

fn subtask_from_row(row: &tokio_postgres::Row) -> StoredSubtask {
    StoredSubtask {
        id: row.get("id"),
        task_id: row.get("task_id"),
        title: row.get("title"),
        done: row.get("done"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &tokio_postgres::Row) -> StoredComment {
    StoredComment {
        id: row.get("id"),
        task_id: row.get("task_id"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_task(
    pool: &PgPool,
    focus_id: &Uuid,
    created_by: i64,
    title: &str,
    description: Option<&str>,
    priority: TaskPriority,
    due_at: Option<DateTime<Utc>>,
    assignee_id: Option<i64>,
) -> Result<StoredTask> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();

    let row = client
        .query_one(
            "INSERT INTO tasks (id, focus_id, title, description, priority, due_at, assignee_id, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, focus_id, title, description, priority, status, due_at,
                       assignee_id, created_by, created_at, updated_at, completed_at",
            &[
                &id,
                focus_id,
                &title,
                &description,
                &priority.as_str(),
                &due_at,
                &assignee_id,
                &created_by,
            ],
        )
        .await?;

    task_from_row(&row)
}

pub async fn get_task(pool: &PgPool, id: &Uuid) -> Result<StoredTask> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, focus_id, title, description, priority, status, due_at,
                    assignee_id, created_by, created_at, updated_at, completed_at
             FROM tasks WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;

    task_from_row(&row)
}

pub async fn list_tasks(
    pool: &PgPool,
    focus_id: &Uuid,
    status: Option<TaskStatus>,
    assignee_id: Option<i64>,
) -> Result<Vec<StoredTask>> {
    let client = pool.get().await?;
    let status_str = status.map(|s| s.as_str());

    let rows = client
        .query(
            "SELECT id, focus_id, title, description, priority, status, due_at,
                    assignee_id, created_by, created_at, updated_at, completed_at
             FROM tasks
             WHERE focus_id = $1
               AND ($2::TEXT IS NULL OR status = $2)
               AND ($3::BIGINT IS NULL OR assignee_id = $3)
             ORDER BY created_at DESC",
            &[focus_id, &status_str, &assignee_id],
        )
        .await?;

    let mut tasks = Vec::with_capacity(rows.len());
    for row in &rows {
        tasks.push(task_from_row(row)?);
    }

    Ok(tasks)
}

/// Open tasks rendered into the assistant's context block.
pub async fn list_open_tasks(pool: &PgPool, focus_id: &Uuid, limit: i64) -> Result<Vec<StoredTask>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, focus_id, title, description, priority, status, due_at,
                    assignee_id, created_by, created_at, updated_at, completed_at
             FROM tasks
             WHERE focus_id = $1 AND status <> 'done'
             ORDER BY due_at ASC NULLS LAST, created_at DESC
             LIMIT $2",
            &[focus_id, &limit],
        )
        .await?;

    let mut tasks = Vec::with_capacity(rows.len());
    for row in &rows {
        tasks.push(task_from_row(row)?);
    }

    Ok(tasks)
}

#[allow(clippy::too_many_arguments)]
pub async fn update_task(
    pool: &PgPool,
    id: &Uuid,
    title: &str,
    description: Option<&str>,
    priority: TaskPriority,
    due_at: Option<DateTime<Utc>>,
    assignee_id: Option<i64>,
) -> Result<StoredTask> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "UPDATE tasks
             SET title = $2, description = $3, priority = $4, due_at = $5,
                 assignee_id = $6, updated_at = NOW()
             WHERE id = $1
             RETURNING id, focus_id, title, description, priority, status, due_at,
                       assignee_id, created_by, created_at, updated_at, completed_at",
            &[id, &title, &description, &priority.as_str(), &due_at, &assignee_id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;

    task_from_row(&row)
}

/// Entering `done` stamps `completed_at`; leaving it clears the stamp.
pub async fn set_task_status(pool: &PgPool, id: &Uuid, status: TaskStatus) -> Result<StoredTask> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "UPDATE tasks
             SET status = $2,
                 completed_at = CASE WHEN $2 = 'done' THEN COALESCE(completed_at, NOW()) ELSE NULL END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, focus_id, title, description, priority, status, due_at,
                       assignee_id, created_by, created_at, updated_at, completed_at",
            &[id, &status.as_str()],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("task {}", id)))?;

    task_from_row(&row)
}

pub async fn delete_task(pool: &PgPool, id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let rows_affected = client.execute("DELETE FROM tasks WHERE id = $1", &[id]).await?;
    Ok(rows_affected > 0)
}

// ==================== Subtasks ====================

pub async fn insert_subtask(pool: &PgPool, task_id: &Uuid, title: &str) -> Result<StoredSubtask> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();

    let row = client
        .query_one(
            "INSERT INTO subtasks (id, task_id, title, position)
             SELECT $1, $2, $3, COALESCE(MAX(position) + 1, 0)
             FROM subtasks WHERE task_id = $2
             RETURNING id, task_id, title, done, position, created_at",
            &[&id, task_id, &title],
        )
        .await?;

    Ok(subtask_from_row(&row))
}

pub async fn get_subtask(pool: &PgPool, id: &Uuid) -> Result<StoredSubtask> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, task_id, title, done, position, created_at FROM subtasks WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("subtask {}", id)))?;

    Ok(subtask_from_row(&row))
}

pub async fn list_subtasks(pool: &PgPool, task_id: &Uuid) -> Result<Vec<StoredSubtask>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, task_id, title, done, position, created_at
             FROM subtasks WHERE task_id = $1
             ORDER BY position ASC, created_at ASC",
            &[task_id],
        )
        .await?;

    Ok(rows.iter().map(subtask_from_row).collect())
}

pub async fn update_subtask(pool: &PgPool, id: &Uuid, title: &str, done: bool) -> Result<StoredSubtask> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "UPDATE subtasks SET title = $2, done = $3 WHERE id = $1
             RETURNING id, task_id, title, done, position, created_at",
            &[id, &title, &done],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("subtask {}", id)))?;

    Ok(subtask_from_row(&row))
}

pub async fn delete_subtask(pool: &PgPool, id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let rows_affected = client
        .execute("DELETE FROM subtasks WHERE id = $1", &[id])
        .await?;
    Ok(rows_affected > 0)
}

// ==================== Comments ====================

pub async fn insert_comment(
    pool: &PgPool,
    task_id: &Uuid,
    author_id: i64,
    body: &str,
) -> Result<StoredComment> {
    let client = pool.get().await?;
    let id = Uuid::new_v4();

    let row = client
        .query_one(
            "INSERT INTO task_comments (id, task_id, author_id, body)
             VALUES ($1, $2, $3, $4)
             RETURNING id, task_id, author_id, body, created_at",
            &[&id, task_id, &author_id, &body],
        )
        .await?;

    Ok(comment_from_row(&row))
}

pub async fn get_comment(pool: &PgPool, id: &Uuid) -> Result<StoredComment> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, task_id, author_id, body, created_at FROM task_comments WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("comment {}", id)))?;

    Ok(comment_from_row(&row))
}

pub async fn list_comments(pool: &PgPool, task_id: &Uuid) -> Result<Vec<StoredComment>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, task_id, author_id, body, created_at
             FROM task_comments WHERE task_id = $1
             ORDER BY created_at ASC",
            &[task_id],
        )
        .await?;

    Ok(rows.iter().map(comment_from_row).collect())
}

pub async fn delete_comment(pool: &PgPool, id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let rows_affected = client
        .execute("DELETE FROM task_comments WHERE id = $1", &[id])
        .await?;
    Ok(rows_affected > 0)
}

// ==================== Reminder scans ====================

fn reminder_from_row(row: &tokio_postgres::Row) -> ReminderTask {
    ReminderTask {
        task_id: row.get("task_id"),
        title: row.get("title"),
        focus_title: row.get("focus_title"),
        due_at: row.get("due_at"),
        notify_user_id: row.get("notify_user_id"),
    }
}

/// Unfinished tasks whose deadline falls within the next `window_hours`.
/// Archived focuses are skipped.
pub async fn list_due_soon(pool: &PgPool, window_hours: i32) -> Result<Vec<ReminderTask>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT t.id AS task_id, t.title, f.title AS focus_title, t.due_at,
                    COALESCE(t.assignee_id, f.owner_id) AS notify_user_id
             FROM tasks t
             JOIN focuses f ON f.id = t.focus_id
             WHERE t.status <> 'done'
               AND f.archived = FALSE
               AND t.due_at > NOW()
               AND t.due_at <= NOW() + make_interval(hours => $1)
             ORDER BY t.due_at ASC",
            &[&window_hours],
        )
        .await?;

    Ok(rows.iter().map(reminder_from_row).collect())
}

/// Unfinished tasks whose deadline has already passed.
pub async fn list_overdue(pool: &PgPool) -> Result<Vec<ReminderTask>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT t.id AS task_id, t.title, f.title AS focus_title, t.due_at,
                    COALESCE(t.assignee_id, f.owner_id) AS notify_user_id
             FROM tasks t
             JOIN focuses f ON f.id = t.focus_id
             WHERE t.status <> 'done'
               AND f.archived = FALSE
               AND t.due_at <= NOW()
             ORDER BY t.due_at ASC",
            &[],
        )
        .await?;

    Ok(rows.iter().map(reminder_from_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("blocked"), None);
    }

    #[test]
    fn test_priority_round_trip() {
        for priority in [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High] {
            assert_eq!(TaskPriority::parse(priority.as_str()), Some(priority));
        }
        assert_eq!(TaskPriority::parse("urgent"), None);
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: TaskStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(parsed, TaskStatus::Done);
    }
}
