//! Ollama Chat API client
//!
//! Non-streaming `/api/chat` calls at temperature 0. Transport failures are
//! retried a fixed number of times; malformed responses are not.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ChatError, ChatMessage, ChatModel};

/// Configuration for [`OllamaChat`]
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server
    pub url: String,
    /// Model name (e.g., "qwen3")
    pub model: String,
    /// Longest conversation the client will send
    pub max_input_messages: usize,
    /// Extra attempts after a transport failure
    pub transport_retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "qwen3".to_string(),
            max_input_messages: 50,
            transport_retries: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// Response from /api/chat
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
    #[serde(default)]
    eval_count: u32,
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct OllamaChat {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let endpoint = format!("{}/api/chat", self.config.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": 0.0
            }
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let parsed: ChatResponse = serde_json::from_str(&text)?;
        debug!(eval_count = parsed.eval_count, "Chat response received");

        let content = strip_thinking(&parsed.message.content);
        if content.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(content.to_string())
    }
}

/// Drop a leading `<think>…</think>` block emitted by reasoning models
fn strip_thinking(content: &str) -> &str {
    let trimmed = content.trim_start();
    if trimmed.starts_with("<think>") {
        if let Some(end) = trimmed.find("</think>") {
            return trimmed[end + "</think>".len()..].trim_start();
        }
    }
    content
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if messages.len() > self.config.max_input_messages {
            return Err(ChatError::TooManyMessages {
                count: messages.len(),
                max: self.config.max_input_messages,
            });
        }

        let mut attempt = 0;
        loop {
            match self.send_once(messages).await {
                Err(ChatError::Request(e)) if attempt < self.config.transport_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        retries = self.config.transport_retries,
                        "Ollama request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OllamaConfig::default();
        assert_eq!(config.url, "http://localhost:11434");
        assert_eq!(config.max_input_messages, 50);
        assert_eq!(config.transport_retries, 5);
    }

    #[test]
    fn test_strip_thinking() {
        assert_eq!(strip_thinking("<think>hmm</think>\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_thinking("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_thinking("<think>unterminated"), "<think>unterminated");
    }

    #[tokio::test]
    async fn test_message_cap_is_checked_before_sending() {
        let chat = OllamaChat::new(OllamaConfig {
            url: "http://127.0.0.1:9".to_string(),
            max_input_messages: 2,
            ..Default::default()
        });
        let messages = vec![ChatMessage::user("a"); 3];
        match chat.complete(&messages).await {
            Err(ChatError::TooManyMessages { count, max }) => {
                assert_eq!((count, max), (3, 2));
            }
            other => panic!("expected TooManyMessages, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_gives_request_error() {
        let chat = OllamaChat::new(OllamaConfig {
            url: "http://127.0.0.1:9".to_string(),
            transport_retries: 1,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        });
        let result = chat.complete(&[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(ChatError::Request(_))));
    }
}
