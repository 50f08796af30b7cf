//! Notifier - where conversation progress is reported
//!
//! The task loop reports every message it appends and every chunk of
//! command output it sees. Delivery is fire-and-forget: a notifier must not
//! block and cannot fail the task.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::llm::Role;

/// Receives conversation progress
pub trait Notifier: Send + Sync {
    /// A message was appended to the conversation
    fn notify(&self, role: Role, content: &str, id: &str);

    /// Output captured so far for the message `stream_id`
    fn stream_partial(&self, stream_id: &str, text: &str);
}

/// Prints progress to stdout
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier {
    /// Print partial command output as it arrives
    pub show_partials: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, role: Role, content: &str, id: &str) {
        let tag = match role {
            Role::System => "ENV",
            Role::User => "USER",
            Role::Assistant => "MODEL",
        };
        println!("[{}] ({})\n{}\n", tag, id, content);
    }

    fn stream_partial(&self, stream_id: &str, text: &str) {
        if self.show_partials {
            let last = text.lines().last().unwrap_or("");
            println!("[SANDBOX] ({}) … {}", stream_id, last);
        }
    }
}

/// Reports progress as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, role: Role, content: &str, id: &str) {
        info!(%role, id, chars = content.len(), "Message appended");
        debug!(id, "{}", content);
    }

    fn stream_partial(&self, stream_id: &str, text: &str) {
        debug!(stream_id, bytes = text.len(), "Partial command output");
    }
}

/// Progress event sent by [`ChannelNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Message {
        role: Role,
        content: String,
        id: String,
    },
    Partial {
        stream_id: String,
        text: String,
    },
}

/// Forwards progress to a channel, e.g. for a UI task
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<NotifyEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotifyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, role: Role, content: &str, id: &str) {
        // A closed receiver means nobody is listening any more
        let _ = self.tx.send(NotifyEvent::Message {
            role,
            content: content.to_string(),
            id: id.to_string(),
        });
    }

    fn stream_partial(&self, stream_id: &str, text: &str) {
        let _ = self.tx.send(NotifyEvent::Partial {
            stream_id: stream_id.to_string(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_forwards_events() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Role::Assistant, "{\"action\":\"validateEdit\"}", "1.1");
        notifier.stream_partial("1.2", "compiling");

        assert_eq!(
            rx.recv().await,
            Some(NotifyEvent::Message {
                role: Role::Assistant,
                content: "{\"action\":\"validateEdit\"}".to_string(),
                id: "1.1".to_string(),
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(NotifyEvent::Partial {
                stream_id: "1.2".to_string(),
                text: "compiling".to_string(),
            })
        );
    }

    #[test]
    fn test_channel_notifier_ignores_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Role::User, "hi", "1");
    }
}
