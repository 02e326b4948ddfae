//! Assistant endpoints: threads and messages.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::api::routes::{focus_for_member, optional_text, require_text};
use crate::api::state::ApiState;
use crate::assistant::parse::{self, SuggestedTask};
use crate::assistant::prompt::{self, CONTEXT_TASK_LIMIT};
use crate::error::ApiError;
use crate::storage;
use crate::storage::assistant::{MessageRole, StoredMessage, StoredThread};
use crate::storage::focuses::{MemberRole, StoredFocus, FOCUS_TITLE_MAX};
use crate::storage::pg::PgPool;
use crate::storage::users::StoredUser;

const MESSAGE_CONTENT_MAX: usize = 4000;
const DEFAULT_MESSAGE_LIMIT: i64 = 50;
const MAX_MESSAGE_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
}

/// POST /api/v1/focuses/:id/assistant/threads
pub async fn create_thread(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<StoredThread>), ApiError> {
    focus_for_member(&state.pool, focus_id, user.id).await?;
    let title = optional_text("title", req.title, FOCUS_TITLE_MAX)?;

    let thread =
        storage::assistant::insert_thread(&state.pool, &focus_id, user.id, title.as_deref())
            .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// GET /api/v1/focuses/:id/assistant/threads
pub async fn list_threads(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
) -> Result<Json<Vec<StoredThread>>, ApiError> {
    focus_for_member(&state.pool, focus_id, user.id).await?;
    let threads = storage::assistant::list_threads(&state.pool, &focus_id).await?;
    Ok(Json(threads))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/assistant/threads/:id/messages
pub async fn list_messages(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let (thread, _, _) = thread_for_member(&state.pool, thread_id, user.id).await?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(1, MAX_MESSAGE_LIMIT);

    let messages = storage::assistant::list_messages(&state.pool, &thread.id, limit).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
    pub suggested_tasks: Vec<SuggestedTask>,
}

/// POST /api/v1/assistant/threads/:id/messages
///
/// Stores the user's message, asks the gateway with the focus context and
/// recent history, stores the reply. The user message survives an upstream
/// failure; the client may retry and the thread stays consistent.
pub async fn send_message(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let (thread, focus, _) = thread_for_member(&state.pool, thread_id, user.id).await?;
    let content = require_text("content", &req.content, MESSAGE_CONTENT_MAX)?;

    // Snapshot context before the new message lands so it is not replayed
    // twice in the prompt.
    let open_tasks =
        storage::tasks::list_open_tasks(&state.pool, &thread.focus_id, CONTEXT_TASK_LIMIT).await?;
    let history = storage::assistant::list_messages(
        &state.pool,
        &thread.id,
        state.config.assistant.history_limit,
    )
    .await?;

    let user_message =
        storage::assistant::insert_message(&state.pool, &thread.id, MessageRole::User, &content, None)
            .await?;

    let conversation = prompt::build_messages(&focus, &open_tasks, &history, &content, Utc::now());
    let raw = match state.llm.complete(conversation).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!("assistant gateway failed for thread {}: {:#}", thread.id, err);
            return Err(ApiError::Upstream("assistant request failed".to_string()));
        }
    };

    let parsed = parse::parse_reply(&raw);
    let metadata = if parsed.suggested_tasks.is_empty() {
        None
    } else {
        Some(json!({ "suggested_tasks": parsed.suggested_tasks }))
    };

    let assistant_message = storage::assistant::insert_message(
        &state.pool,
        &thread.id,
        MessageRole::Assistant,
        &parsed.reply,
        metadata,
    )
    .await?;

    Ok(Json(SendMessageResponse {
        user_message,
        assistant_message,
        suggested_tasks: parsed.suggested_tasks,
    }))
}

async fn thread_for_member(
    pool: &PgPool,
    thread_id: Uuid,
    user_id: i64,
) -> Result<(StoredThread, StoredFocus, MemberRole), ApiError> {
    let thread = storage::assistant::get_thread(pool, &thread_id).await?;
    let (focus, role) = focus_for_member(pool, thread.focus_id, user_id).await?;
    Ok((thread, focus, role))
}
