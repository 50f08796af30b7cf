//! Language model collaborator
//!
//! The agent only needs one call: hand over the conversation, get back the
//! next reply as text. [`ChatModel`] is that seam.
//!
//! - `ollama` - [`OllamaChat`], against Ollama's `/api/chat`
//! - `scripted` - [`ScriptedModel`], canned replies for tests and dry runs

pub mod ollama;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::{OllamaChat, OllamaConfig};
pub use scripted::ScriptedModel;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

/// A message in a conversation
///
/// `id` is only used to correlate messages in external displays and is
/// never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub id: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: String::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Error type for chat operations
#[derive(Debug)]
pub enum ChatError {
    Request(reqwest::Error),
    Parse(serde_json::Error),
    EmptyResponse,
    /// The conversation is longer than the client accepts
    TooManyMessages { count: usize, max: usize },
    /// Replies of a [`ScriptedModel`] ran out
    Exhausted,
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Request(e) => write!(f, "Request error: {}", e),
            ChatError::Parse(e) => write!(f, "Parse error: {}", e),
            ChatError::EmptyResponse => write!(f, "Empty response from model"),
            ChatError::TooManyMessages { count, max } => {
                write!(f, "Conversation has {} messages, the limit is {}", count, max)
            }
            ChatError::Exhausted => write!(f, "No scripted replies left"),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Request(e) => Some(e),
            ChatError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Parse(e)
    }
}

/// Produces the next reply of a conversation
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation with one assistant reply
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;

    /// Model name, used as a metrics label
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_skips_id() {
        let msg = ChatMessage::assistant("hi").with_id("1.2");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
    }
}
