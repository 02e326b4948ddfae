//! Invite endpoints: codes, revocation, acceptance.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::routes::focus_for_member;
use crate::api::state::ApiState;
use crate::error::ApiError;
use crate::storage;
use crate::storage::focuses::{MemberRole, StoredFocus};
use crate::storage::invites::StoredInvite;
use crate::storage::users::StoredUser;

const DEFAULT_INVITE_TTL_HOURS: i64 = 24 * 7;
const MAX_INVITE_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub expires_in_hours: Option<i64>,
    pub max_uses: Option<i32>,
}

/// POST /api/v1/focuses/:id/invites
pub async fn create_invite(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<StoredInvite>), ApiError> {
    let (_, role) = focus_for_member(&state.pool, focus_id, user.id).await?;
    if role != MemberRole::Owner {
        return Err(ApiError::Forbidden(
            "only the owner manages invites".to_string(),
        ));
    }

    let ttl_hours = req.expires_in_hours.unwrap_or(DEFAULT_INVITE_TTL_HOURS);
    if !(1..=MAX_INVITE_TTL_HOURS).contains(&ttl_hours) {
        return Err(ApiError::Validation(format!(
            "expires_in_hours must be between 1 and {}",
            MAX_INVITE_TTL_HOURS
        )));
    }
    if let Some(max_uses) = req.max_uses {
        if max_uses < 1 {
            return Err(ApiError::Validation(
                "max_uses must be at least 1".to_string(),
            ));
        }
    }

    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    let invite =
        storage::invites::insert_invite(&state.pool, &focus_id, user.id, expires_at, req.max_uses)
            .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// GET /api/v1/focuses/:id/invites
pub async fn list_invites(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(focus_id): Path<Uuid>,
) -> Result<Json<Vec<StoredInvite>>, ApiError> {
    let (_, role) = focus_for_member(&state.pool, focus_id, user.id).await?;
    if role != MemberRole::Owner {
        return Err(ApiError::Forbidden(
            "only the owner manages invites".to_string(),
        ));
    }

    let invites = storage::invites::list_invites(&state.pool, &focus_id).await?;
    Ok(Json(invites))
}

/// DELETE /api/v1/invites/:id
pub async fn revoke_invite(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Path(invite_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let invite = storage::invites::get_invite(&state.pool, &invite_id).await?;
    let (_, role) = focus_for_member(&state.pool, invite.focus_id, user.id).await?;
    if role != MemberRole::Owner {
        return Err(ApiError::Forbidden(
            "only the owner manages invites".to_string(),
        ));
    }

    storage::invites::revoke_invite(&state.pool, &invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub code: String,
}

/// POST /api/v1/invites/accept
///
/// Joins the caller as a member. Unknown codes are 404; revoked, expired or
/// exhausted codes are 410; joining a focus twice is 409.
pub async fn accept_invite(
    State(state): State<Arc<ApiState>>,
    Extension(user): Extension<StoredUser>,
    Json(req): Json<AcceptInviteRequest>,
) -> Result<Json<StoredFocus>, ApiError> {
    let code = req.code.trim().to_uppercase();
    let invite = storage::invites::get_invite_by_code(&state.pool, &code).await?;

    if storage::focuses::member_role(&state.pool, &invite.focus_id, user.id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "already a member of this focus".to_string(),
        ));
    }
    if !invite.is_redeemable(Utc::now()) {
        return Err(ApiError::Gone("invite is no longer valid".to_string()));
    }

    // The guarded UPDATE re-checks expiry and use count, so two racing
    // accepts cannot overshoot max_uses.
    let redeemed = storage::invites::redeem_invite(&state.pool, &invite.id, user.id).await?;
    if !redeemed {
        return Err(ApiError::Gone("invite is no longer valid".to_string()));
    }

    let focus = storage::focuses::get_focus(&state.pool, &invite.focus_id).await?;
    Ok(Json(focus))
}
