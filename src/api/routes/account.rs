//! Account endpoints: the caller's profile and notification history.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::api::state::ApiState;
use crate::error::ApiError;
use crate::storage::notifications::{self, StoredNotification};
use crate::storage::users::StoredUser;

const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;
const MAX_NOTIFICATION_LIMIT: i64 = 200;

/// GET /api/v1/me
pub async fn get_me(Extension(user): Extension<StoredUser>) -> Json<StoredUser> {
    Json(user)
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<StoredNotification>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .clamp(1, MAX_NOTIFICATION_LIMIT);
    let notifications = notifications::list_for_user(&state.pool, user.id, limit).await?;
    Ok(Json(notifications))
}
