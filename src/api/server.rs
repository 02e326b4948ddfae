//! Router assembly and server startup.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::middleware::require_auth;
use crate::api::routes::{account, assistant, focuses, invites, tasks};
use crate::api::state::ApiState;

/// Request bodies above this are rejected before any handler runs.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/me", get(account::get_me))
        .route("/notifications", get(account::list_notifications))
        .route(
            "/focuses",
            post(focuses::create_focus).get(focuses::list_focuses),
        )
        .route(
            "/focuses/:id",
            get(focuses::get_focus)
                .patch(focuses::update_focus)
                .delete(focuses::delete_focus),
        )
        .route("/focuses/:id/members", get(focuses::list_members))
        .route(
            "/focuses/:id/members/:user_id",
            delete(focuses::remove_member),
        )
        .route(
            "/focuses/:id/tasks",
            post(tasks::create_task).get(tasks::list_tasks),
        )
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/:id/status", post(tasks::set_task_status))
        .route("/tasks/:id/subtasks", post(tasks::create_subtask))
        .route(
            "/subtasks/:id",
            patch(tasks::update_subtask).delete(tasks::delete_subtask),
        )
        .route(
            "/tasks/:id/comments",
            post(tasks::create_comment).get(tasks::list_comments),
        )
        .route("/comments/:id", delete(tasks::delete_comment))
        .route(
            "/focuses/:id/assistant/threads",
            post(assistant::create_thread).get(assistant::list_threads),
        )
        .route(
            "/assistant/threads/:id/messages",
            get(assistant::list_messages).post(assistant::send_message),
        )
        .route(
            "/focuses/:id/invites",
            post(invites::create_invite).get(invites::list_invites),
        )
        .route("/invites/:id", delete(invites::revoke_invite))
        .route("/invites/accept", post(invites::accept_invite))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "focal",
    }))
}

pub async fn run_server(state: Arc<ApiState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║{:62}║", "  Focal API server");
    info!("║{:62}║", format!("  Listening on {}", addr));
    info!("║{:62}║", "  Routes under /api/v1, liveness at /health");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::LlmClient;
    use crate::config::AppConfig;
    use crate::storage::pg;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    /// Pool creation is lazy, so a router over an unreachable database still
    /// serves everything that does not touch storage.
    fn test_state() -> Arc<ApiState> {
        let config = AppConfig::default();
        let pool = pg::create_pool(&config.pg).unwrap();
        let llm = LlmClient::new(config.assistant.clone()).unwrap();
        Arc::new(ApiState::new(pool, llm, config))
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_reject_missing_credentials() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_routes_reject_wrong_scheme() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/me")
                    .header("Authorization", "Bearer not-initdata")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
