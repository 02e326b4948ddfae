//! Focus endpoints: CRUD and membership.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::routes::{double_option, focus_for_member, optional_text, require_text};
use crate::api::state::ApiState;
use crate::error::ApiError;
use crate::storage;
use crate::storage::focuses::{
    FocusListEntry, FocusMemberEntry, MemberRole, StoredFocus, FOCUS_DESCRIPTION_MAX,
    FOCUS_TITLE_MAX,
};
use crate::storage::users::StoredUser;

#[derive(Debug, Deserialize)]
pub struct CreateFocusRequest {
    pub title: String,
    pub description: Option<String>,
}

/// POST /api/v1/focuses
pub async fn create_focus(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Json(req): Json<CreateFocusRequest>,
) -> Result<(StatusCode, Json<StoredFocus>), ApiError> {
    let title = require_text("title", &req.title, FOCUS_TITLE_MAX)?;
    let description = optional_text("description", req.description, FOCUS_DESCRIPTION_MAX)?;

    let focus =
        storage::focuses::insert_focus(&state.pool, user.id, &title, description.as_deref())
            .await?;
    Ok((StatusCode::CREATED, Json(focus)))
}

#[derive(Debug, Deserialize)]
pub struct ListFocusesQuery {
    pub include_archived: Option<bool>,
}

/// GET /api/v1/focuses
pub async fn list_focuses(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Query(query): Query<ListFocusesQuery>,
) -> Result<Json<Vec<FocusListEntry>>, ApiError> {
    let focuses = storage::focuses::list_focuses_for_user(
        &state.pool,
        user.id,
        query.include_archived.unwrap_or(false),
    )
    .await?;
    Ok(Json(focuses))
}

#[derive(Debug, Serialize)]
pub struct FocusDetail {
    #[serde(flatten)]
    pub focus: StoredFocus,
    pub role: MemberRole,
    pub members: Vec<FocusMemberEntry>,
}

/// GET /api/v1/focuses/:id
pub async fn get_focus(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
) -> Result<Json<FocusDetail>, ApiError> {
    let (focus, role) = focus_for_member(&state.pool, focus_id, user.id).await?;
    let members = storage::focuses::list_members(&state.pool, &focus_id).await?;
    Ok(Json(FocusDetail {
        focus,
        role,
        members,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFocusRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub archived: Option<bool>,
}

/// PATCH /api/v1/focuses/:id
pub async fn update_focus(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
    Json(req): Json<UpdateFocusRequest>,
) -> Result<Json<StoredFocus>, ApiError> {
    let (focus, role) = focus_for_member(&state.pool, focus_id, user.id).await?;
    if role != MemberRole::Owner {
        return Err(ApiError::Forbidden(
            "only the owner edits the focus".to_string(),
        ));
    }

    let title = match req.title {
        Some(title) => require_text("title", &title, FOCUS_TITLE_MAX)?,
        None => focus.title,
    };
    let description = match req.description {
        Some(description) => optional_text("description", description, FOCUS_DESCRIPTION_MAX)?,
        None => focus.description,
    };
    let archived = req.archived.unwrap_or(focus.archived);

    let updated = storage::focuses::update_focus(
        &state.pool,
        &focus_id,
        &title,
        description.as_deref(),
        archived,
    )
    .await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/focuses/:id
pub async fn delete_focus(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (_, role) = focus_for_member(&state.pool, focus_id, user.id).await?;
    if role != MemberRole::Owner {
        return Err(ApiError::Forbidden(
            "only the owner deletes the focus".to_string(),
        ));
    }

    storage::focuses::delete_focus(&state.pool, &focus_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/focuses/:id/members
pub async fn list_members(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
) -> Result<Json<Vec<FocusMemberEntry>>, ApiError> {
    focus_for_member(&state.pool, focus_id, user.id).await?;
    let members = storage::focuses::list_members(&state.pool, &focus_id).await?;
    Ok(Json(members))
}

/// DELETE /api/v1/focuses/:id/members/:user_id
///
/// The owner removes anyone; a member may only remove themselves. The owner
/// row itself is immovable.
pub async fn remove_member(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path((focus_id, member_id)): Path<(Uuid, i64)>,
) -> Result<StatusCode, ApiError> {
    let (focus, role) = focus_for_member(&state.pool, focus_id, user.id).await?;

    if member_id == focus.owner_id {
        return Err(ApiError::Validation(
            "the owner cannot leave their own focus; delete it instead".to_string(),
        ));
    }
    if role != MemberRole::Owner && user.id != member_id {
        return Err(ApiError::Forbidden(
            "only the owner removes other members".to_string(),
        ));
    }

    let removed = storage::focuses::remove_member(&state.pool, &focus_id, member_id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!(
            "member {} in focus {}",
            member_id, focus_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
