//! Focal: backend for a Telegram Mini App that runs a small business.
//!
//! Users group their work into focuses (projects), track tasks with
//! deadlines and assignees, and talk to an LLM assistant that proposes
//! tasks. A background worker delivers queued notifications and runs
//! daily deadline reminder scans over the bot.
//!
//! ## Module Structure
//!
//! The crate is organized into thematic modules:
//! - `auth`: Telegram WebApp initData verification
//! - `storage/`: PostgreSQL persistence (users, focuses, tasks, invites, ...)
//! - `api/`: HTTP surface (router, auth middleware, route handlers)
//! - `assistant/`: LLM gateway (client, prompt assembly, reply parsing)
//! - `worker/`: notification delivery and reminder scheduling
//! - `telegram`: outbound bot messaging
//! - `config`: environment-driven configuration
//! - `error`: API error responses

/// HTTP surface
pub mod api;

/// LLM assistant gateway
pub mod assistant;

/// Telegram WebApp authentication
pub mod auth;

/// Environment-driven configuration
pub mod config;

/// API error responses
pub mod error;

/// Data persistence layer
pub mod storage;

/// Outbound Telegram messaging
pub mod telegram;

/// Background delivery and reminders
pub mod worker;

pub use api::{run_server, ApiState};
pub use assistant::{AssistantReply, ChatMessage, LlmClient, SuggestedTask};
pub use auth::{verify_init_data, AuthError, TelegramUser};
pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use telegram::{MessageSender, TelegramSender};
