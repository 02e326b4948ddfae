//! Request authentication middleware.
//!
//! Every `/api/v1` route runs through [`require_auth`]: the middleware
//! verifies the `Authorization: tma <initData>` header, upserts the user
//! row, and parks the authenticated user in request extensions for the
//! handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::state::ApiState;
use crate::auth::{self, AuthError};
use crate::error::ApiError;
use crate::storage::users;

pub async fn require_auth(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;
    let init_data = tma_init_data(header).ok_or(AuthError::MissingCredentials)?;

    let tg_user = auth::verify_init_data(
        init_data,
        &state.config.telegram.bot_token,
        state.config.telegram.initdata_max_age_secs,
    )?;

    let user = users::upsert_user(&state.pool, &tg_user).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Mini Apps send `Authorization: tma <initData>`.
fn tma_init_data(header: &str) -> Option<&str> {
    let init_data = header.strip_prefix("tma ")?.trim();
    if init_data.is_empty() {
        None
    } else {
        Some(init_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tma_scheme_parsing() {
        assert_eq!(tma_init_data("tma auth_date=1&hash=ab"), Some("auth_date=1&hash=ab"));
        assert_eq!(tma_init_data("tma "), None);
        assert_eq!(tma_init_data("Bearer token"), None);
        assert_eq!(tma_init_data("auth_date=1&hash=ab"), None);
    }
}
