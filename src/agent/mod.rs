//! Agent module for LLM-driven coding tasks
//!
//! The task loop talks to the model turn by turn, executes the action each
//! reply asks for, and feeds the result back until the model reports the
//! task as completed.

pub mod controller;
pub mod notify;
pub mod prompt;

pub use controller::{
    AbortReason, ActionError, MessageIds, TaskConfig, TaskError, TaskLoop, TaskOutcome,
    TaskRequest, TaskStatus,
};
pub use notify::{ChannelNotifier, ConsoleNotifier, Notifier, NotifyEvent, TracingNotifier};
