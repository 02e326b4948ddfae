//! Outbound Telegram delivery.
//!
//! The worker talks to Telegram through the [`MessageSender`] trait so
//! delivery can be mocked in tests. [`TelegramSender`] is the production
//! implementation on top of the Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

/// Sends a text message to a Telegram chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

/// Bot API backed sender. Messages are sent as HTML, so callers escape
/// any user-provided content first.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
        }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}
