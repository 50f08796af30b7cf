//! Sandpiper - an LLM coding agent with a persistent Docker sandbox
//!
//! The model works on a repository turn by turn: it asks for file summaries
//! and line ranges, runs shell commands in a sandbox container, and proposes
//! edits that are previewed and confirmed before they touch disk.
//!
//! # Modules
//!
//! - `protocol` - action schema and the parser for model replies
//! - `agent` - the task loop, notifiers and prompts
//! - `edits` - staged edits (preview, validate, apply)
//! - `sandbox` - the command sandbox and its Docker client
//! - `llm` - the model collaborator (Ollama, scripted)
//! - `workspace` - file access, summaries, repository context
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - log and OpenTelemetry setup
//!
//! # Quick Start
//!
//! ```ignore
//! use sandpiper::{TaskLoop, TaskRequest, TaskConfig};
//!
//! let task_loop = TaskLoop::new(model, files, notifier, TaskConfig::default())
//!     .with_sandbox(sandbox);
//! let outcome = task_loop.run(TaskRequest::new("fix the failing test"), &cancel).await?;
//! ```

pub mod agent;
pub mod edits;
pub mod llm;
pub mod metrics;
pub mod protocol;
pub mod sandbox;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracing;
pub mod workspace;

// Re-export commonly used types at crate root for convenience
pub use agent::{TaskConfig, TaskLoop, TaskOutcome, TaskRequest, TaskStatus};
pub use protocol::Action;
pub use sandbox::{SandboxConfig, SandboxSession};
