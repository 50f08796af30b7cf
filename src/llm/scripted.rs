//! Canned replies instead of a real model

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatError, ChatMessage, ChatModel};

/// Replays queued replies in order and records every request
///
/// Once the queue is empty it keeps answering with the fallback reply if
/// one was set, otherwise it fails with [`ChatError::Exhausted`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` forever after the queue runs out
    pub fn repeating(self, reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..self
        }
    }

    /// Conversations received so far, one entry per call
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.or_else(|| self.fallback.clone())
            .ok_or(ChatError::Exhausted)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
