//! Task endpoints: tasks, subtasks, and comments.
//!
//! Everything under a task is open to any member of its focus, with two
//! carve-outs: status changes belong to the assignee or the owner, and
//! deletes belong to the creator (or author) or the owner.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::routes::{
    double_option, focus_for_member, optional_text, require_text, task_for_member,
};
use crate::api::state::ApiState;
use crate::error::ApiError;
use crate::storage;
use crate::storage::focuses::MemberRole;
use crate::storage::pg::PgPool;
use crate::storage::tasks::{
    StoredComment, StoredSubtask, StoredTask, TaskPriority, TaskStatus, COMMENT_BODY_MAX,
    TASK_DESCRIPTION_MAX, TASK_TITLE_MAX,
};
use crate::storage::users::StoredUser;

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<i64>,
}

/// POST /api/v1/focuses/:id/tasks
pub async fn create_task(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<StoredTask>), ApiError> {
    focus_for_member(&state.pool, focus_id, user.id).await?;

    let title = require_text("title", &req.title, TASK_TITLE_MAX)?;
    let description = optional_text("description", req.description, TASK_DESCRIPTION_MAX)?;
    let priority = parse_priority(req.priority.as_deref())?.unwrap_or(TaskPriority::Medium);
    if let Some(assignee_id) = req.assignee_id {
        ensure_assignee_is_member(&state.pool, &focus_id, assignee_id).await?;
    }

    let task = storage::tasks::insert_task(
        &state.pool,
        &focus_id,
        user.id,
        &title,
        description.as_deref(),
        priority,
        req.due_at,
        req.assignee_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub assignee_id: Option<i64>,
}

/// GET /api/v1/focuses/:id/tasks
pub async fn list_tasks(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<StoredTask>>, ApiError> {
    focus_for_member(&state.pool, focus_id, user.id).await?;

    let status = match query.status.as_deref() {
        Some(s) => Some(
            TaskStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("unknown status: {}", s)))?,
        ),
        None => None,
    };

    let tasks =
        storage::tasks::list_tasks(&state.pool, &focus_id, status, query.assignee_id).await?;
    Ok(Json(tasks))
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: StoredTask,
    pub subtasks: Vec<StoredSubtask>,
    pub comments: Vec<StoredComment>,
}

/// GET /api/v1/tasks/:id
pub async fn get_task(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskDetail>, ApiError> {
    let (task, _) = task_for_member(&state.pool, task_id, user.id).await?;
    let subtasks = storage::tasks::list_subtasks(&state.pool, &task_id).await?;
    let comments = storage::tasks::list_comments(&state.pool, &task_id).await?;
    Ok(Json(TaskDetail {
        task,
        subtasks,
        comments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<i64>>,
}

/// PATCH /api/v1/tasks/:id
pub async fn update_task(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<StoredTask>, ApiError> {
    let (task, _) = task_for_member(&state.pool, task_id, user.id).await?;

    let title = match req.title {
        Some(title) => require_text("title", &title, TASK_TITLE_MAX)?,
        None => task.title,
    };
    let description = match req.description {
        Some(description) => optional_text("description", description, TASK_DESCRIPTION_MAX)?,
        None => task.description,
    };
    let priority = parse_priority(req.priority.as_deref())?.unwrap_or(task.priority);
    let due_at = req.due_at.unwrap_or(task.due_at);
    let assignee_id = req.assignee_id.unwrap_or(task.assignee_id);

    if let Some(assignee) = assignee_id {
        ensure_assignee_is_member(&state.pool, &task.focus_id, assignee).await?;
    }

    let updated = storage::tasks::update_task(
        &state.pool,
        &task_id,
        &title,
        description.as_deref(),
        priority,
        due_at,
        assignee_id,
    )
    .await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

/// POST /api/v1/tasks/:id/status
///
/// Only the assignee or the focus owner moves a task between statuses.
pub async fn set_task_status(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<StoredTask>, ApiError> {
    let (task, role) = task_for_member(&state.pool, task_id, user.id).await?;

    if !may_set_status(task.assignee_id, user.id, role) {
        return Err(ApiError::Forbidden(
            "only the assignee or the owner changes task status".to_string(),
        ));
    }

    let status = TaskStatus::parse(&req.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown status: {}", req.status)))?;

    let updated = storage::tasks::set_task_status(&state.pool, &task_id, status).await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/tasks/:id
pub async fn delete_task(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (task, role) = task_for_member(&state.pool, task_id, user.id).await?;

    if !may_delete(task.created_by, user.id, role) {
        return Err(ApiError::Forbidden(
            "only the task creator or the owner deletes a task".to_string(),
        ));
    }

    storage::tasks::delete_task(&state.pool, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// SUBTASKS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
}

/// POST /api/v1/tasks/:id/subtasks
pub async fn create_subtask(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CreateSubtaskRequest>,
) -> Result<(StatusCode, Json<StoredSubtask>), ApiError> {
    task_for_member(&state.pool, task_id, user.id).await?;
    let title = require_text("title", &req.title, TASK_TITLE_MAX)?;

    let subtask = storage::tasks::insert_subtask(&state.pool, &task_id, &title).await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubtaskRequest {
    pub title: Option<String>,
    pub done: Option<bool>,
}

/// PATCH /api/v1/subtasks/:id
pub async fn update_subtask(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(subtask_id): Path<Uuid>,
    Json(req): Json<UpdateSubtaskRequest>,
) -> Result<Json<StoredSubtask>, ApiError> {
    let subtask = storage::tasks::get_subtask(&state.pool, &subtask_id).await?;
    task_for_member(&state.pool, subtask.task_id, user.id).await?;

    let title = match req.title {
        Some(title) => require_text("title", &title, TASK_TITLE_MAX)?,
        None => subtask.title,
    };
    let done = req.done.unwrap_or(subtask.done);

    let updated = storage::tasks::update_subtask(&state.pool, &subtask_id, &title, done).await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/subtasks/:id
pub async fn delete_subtask(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(subtask_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let subtask = storage::tasks::get_subtask(&state.pool, &subtask_id).await?;
    task_for_member(&state.pool, subtask.task_id, user.id).await?;

    storage::tasks::delete_subtask(&state.pool, &subtask_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// COMMENTS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

/// POST /api/v1/tasks/:id/comments
pub async fn create_comment(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<StoredComment>), ApiError> {
    task_for_member(&state.pool, task_id, user.id).await?;
    let body = require_text("body", &req.body, COMMENT_BODY_MAX)?;

    let comment = storage::tasks::insert_comment(&state.pool, &task_id, user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/v1/tasks/:id/comments
pub async fn list_comments(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<StoredComment>>, ApiError> {
    task_for_member(&state.pool, task_id, user.id).await?;
    let comments = storage::tasks::list_comments(&state.pool, &task_id).await?;
    Ok(Json(comments))
}

/// DELETE /api/v1/comments/:id
pub async fn delete_comment(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let comment = storage::tasks::get_comment(&state.pool, &comment_id).await?;
    let (_, role) = task_for_member(&state.pool, comment.task_id, user.id).await?;

    if !may_delete(comment.author_id, user.id, role) {
        return Err(ApiError::Forbidden(
            "only the comment author or the owner deletes a comment".to_string(),
        ));
    }

    storage::tasks::delete_comment(&state.pool, &comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Status changes belong to the assignee or the focus owner.
fn may_set_status(assignee_id: Option<i64>, user_id: i64, role: MemberRole) -> bool {
    assignee_id == Some(user_id) || role == MemberRole::Owner
}

/// Deletes belong to whoever created the resource, or the focus owner.
fn may_delete(created_by: i64, user_id: i64, role: MemberRole) -> bool {
    created_by == user_id || role == MemberRole::Owner
}

fn parse_priority(raw: Option<&str>) -> Result<Option<TaskPriority>, ApiError> {
    match raw {
        Some(p) => TaskPriority::parse(p)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("unknown priority: {}", p))),
        None => Ok(None),
    }
}

async fn ensure_assignee_is_member(
    pool: &PgPool,
    focus_id: &Uuid,
    assignee_id: i64,
) -> Result<(), ApiError> {
    if storage::focuses::member_role(pool, focus_id, assignee_id)
        .await?
        .is_none()
    {
        return Err(ApiError::Validation(format!(
            "assignee {} is not a member of this focus",
            assignee_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: i64 = 100;
    const BOB: i64 = 200;

    #[test]
    fn test_assignee_changes_status_regardless_of_role() {
        assert!(may_set_status(Some(ALICE), ALICE, MemberRole::Member));
        assert!(may_set_status(Some(ALICE), ALICE, MemberRole::Owner));
    }

    #[test]
    fn test_owner_changes_status_of_any_task() {
        assert!(may_set_status(Some(BOB), ALICE, MemberRole::Owner));
        assert!(may_set_status(None, ALICE, MemberRole::Owner));
    }

    #[test]
    fn test_plain_member_cannot_change_others_status() {
        assert!(!may_set_status(Some(BOB), ALICE, MemberRole::Member));
        assert!(!may_set_status(None, ALICE, MemberRole::Member));
    }

    #[test]
    fn test_delete_policy() {
        assert!(may_delete(ALICE, ALICE, MemberRole::Member));
        assert!(may_delete(BOB, ALICE, MemberRole::Owner));
        assert!(!may_delete(BOB, ALICE, MemberRole::Member));
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority(None).unwrap(), None);
        assert_eq!(
            parse_priority(Some("high")).unwrap(),
            Some(TaskPriority::High)
        );
        assert!(matches!(
            parse_priority(Some("urgent")),
            Err(ApiError::Validation(_))
        ));
    }
}
