//! HTTP client for the assistant's chat completions API.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AssistantConfig;

/// One message in a chat completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    client: Client,
    config: AssistantConfig,
}

impl LlmClient {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!("assistant client: model={}", config.model);
        Ok(Self { client, config })
    }

    /// Send the conversation and return the first choice's content.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        debug!("calling assistant: messages={}", messages.len());

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&ChatRequest {
                model: self.config.model.clone(),
                messages,
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            })
            .send()
            .await
            .context("assistant request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("assistant error: status={} body={}", status, err);
        }

        let chat: ChatResponse = resp.json().await.context("assistant response not JSON")?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .context("assistant returned no choices")?;

        debug!("assistant response: {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_config(api_base: String) -> AssistantConfig {
        AssistantConfig {
            api_base,
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "Here is a plan."}}
                ]
            }));
        });

        let client = LlmClient::new(test_config(server.url(""))).unwrap();
        let content = client
            .complete(vec![ChatMessage::user("help me plan")])
            .await
            .unwrap();

        assert_eq!(content, "Here is a plan.");
        mock.assert();
    }

    #[tokio::test]
    async fn test_complete_sends_model_and_messages() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .json_body_partial(
                    json!({
                        "model": "gpt-4o-mini",
                        "messages": [
                            {"role": "system", "content": "sys"},
                            {"role": "user", "content": "hi"}
                        ]
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            }));
        });

        let client = LlmClient::new(test_config(server.url(""))).unwrap();
        client
            .complete(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_complete_fails_on_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        });

        let client = LlmClient::new(test_config(server.url(""))).unwrap();
        let err = client
            .complete(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_complete_fails_on_empty_choices() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        });

        let client = LlmClient::new(test_config(server.url(""))).unwrap();
        let err = client
            .complete(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no choices"));
    }
}
