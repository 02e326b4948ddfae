//! Shared state for API handlers.

use crate::assistant::LlmClient;
use crate::config::AppConfig;
use crate::storage::pg::PgPool;

/// Everything a handler needs, shared behind an `Arc`.
pub struct ApiState {
    pub pool: PgPool,
    pub llm: LlmClient,
    pub config: AppConfig,
}

impl ApiState {
    pub fn new(pool: PgPool, llm: LlmClient, config: AppConfig) -> Self {
        Self { pool, llm, config }
    }
}
