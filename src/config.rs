//! Application Configuration
//!
//! All settings come from the environment. Each section has sensible
//! defaults; only the Telegram bot token and the assistant API key have
//! none and are checked by [`AppConfig::validate`] at startup.

use crate::storage::pg::PgConfig;

/// Complete application configuration shared by the server and the worker.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listener settings (server only)
    pub http: HttpConfig,
    /// PostgreSQL connection settings
    pub pg: PgConfig,
    /// Telegram bot credentials and initData freshness window
    pub telegram: TelegramConfig,
    /// LLM assistant gateway settings
    pub assistant: AssistantConfig,
    /// Notification worker settings (worker only)
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load the full configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            http: HttpConfig::from_env(),
            pg: PgConfig::from_env(),
            telegram: TelegramConfig::from_env(),
            assistant: AssistantConfig::from_env(),
            worker: WorkerConfig::from_env(),
        }
    }

    /// Fail fast on settings that have no usable default.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN is not set");
        }
        if self.assistant.api_key.is_empty() {
            anyhow::bail!("ASSISTANT_API_KEY is not set");
        }
        if crate::worker::reminders::parse_hhmm(&self.worker.due_soon_at).is_none() {
            anyhow::bail!(
                "REMINDER_DUE_SOON_AT is not HH:MM: {}",
                self.worker.due_soon_at
            );
        }
        if crate::worker::reminders::parse_hhmm(&self.worker.overdue_at).is_none() {
            anyhow::bail!("REMINDER_OVERDUE_AT is not HH:MM: {}", self.worker.overdue_at);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            pg: PgConfig::default(),
            telegram: TelegramConfig::default(),
            assistant: AssistantConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("HTTP_HOST").unwrap_or(default.host),
            port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Telegram bot credentials.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token used both to verify initData and to send messages
    pub bot_token: String,
    /// How old an initData auth_date may be before it is rejected
    pub initdata_max_age_secs: i64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("initdata_max_age_secs", &self.initdata_max_age_secs)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            initdata_max_age_secs: crate::auth::DEFAULT_INIT_DATA_MAX_AGE_SECS,
        }
    }
}

impl TelegramConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            initdata_max_age_secs: std::env::var("INITDATA_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.initdata_max_age_secs),
        }
    }
}

/// LLM assistant gateway settings.
#[derive(Clone)]
pub struct AssistantConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// How many prior messages to replay into the prompt
    pub history_limit: i64,
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.4,
            timeout_secs: 30,
            history_limit: 20,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base: std::env::var("ASSISTANT_API_BASE").unwrap_or(default.api_base),
            api_key: std::env::var("ASSISTANT_API_KEY").unwrap_or_default(),
            model: std::env::var("ASSISTANT_MODEL").unwrap_or(default.model),
            max_tokens: std::env::var("ASSISTANT_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_tokens),
            temperature: std::env::var("ASSISTANT_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.temperature),
            timeout_secs: std::env::var("ASSISTANT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_secs),
            history_limit: std::env::var("ASSISTANT_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.history_limit),
        }
    }
}

/// Notification worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Seconds between queue polls
    pub poll_interval_secs: u64,
    /// Notifications claimed per poll
    pub batch_size: i64,
    /// Delivery attempts before a notification is marked failed
    pub max_attempts: i32,
    /// UTC wall-clock time of the daily due-soon scan, "HH:MM"
    pub due_soon_at: String,
    /// UTC wall-clock time of the daily overdue scan, "HH:MM"
    pub overdue_at: String,
    /// How far ahead the due-soon scan looks, in hours
    pub due_soon_window_hours: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            batch_size: 10,
            max_attempts: 3,
            due_soon_at: "09:00".to_string(),
            overdue_at: "09:30".to_string(),
            due_soon_window_hours: 24,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            poll_interval_secs: std::env::var("WORKER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_interval_secs),
            batch_size: std::env::var("WORKER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.batch_size),
            max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_attempts),
            due_soon_at: std::env::var("REMINDER_DUE_SOON_AT").unwrap_or(default.due_soon_at),
            overdue_at: std::env::var("REMINDER_OVERDUE_AT").unwrap_or(default.overdue_at),
            due_soon_window_hours: std::env::var("REMINDER_DUE_SOON_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.due_soon_window_hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.telegram.initdata_max_age_secs, 86400);
        assert_eq!(config.assistant.history_limit, 20);
        assert_eq!(config.worker.poll_interval_secs, 5);
        assert_eq!(config.worker.batch_size, 10);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.worker.due_soon_at, "09:00");
        assert_eq!(config.worker.overdue_at, "09:30");
        assert_eq!(config.worker.due_soon_window_hours, 24);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let telegram = TelegramConfig {
            bot_token: "12345:AAsecret".to_string(),
            ..Default::default()
        };
        let shown = format!("{:?}", telegram);
        assert!(!shown.contains("AAsecret"));

        let assistant = AssistantConfig {
            api_key: "sk-verysecret".to_string(),
            ..Default::default()
        };
        let shown = format!("{:?}", assistant);
        assert!(!shown.contains("sk-verysecret"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = AppConfig {
            telegram: TelegramConfig {
                bot_token: "12345:AA".to_string(),
                ..Default::default()
            },
            assistant: AssistantConfig {
                api_key: "sk-test".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.telegram.bot_token.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_reminder_time() {
        let mut config = AppConfig {
            telegram: TelegramConfig {
                bot_token: "12345:AA".to_string(),
                ..Default::default()
            },
            assistant: AssistantConfig {
                api_key: "sk-test".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.worker.due_soon_at = "9 am".to_string();
        assert!(config.validate().is_err());
    }
}
