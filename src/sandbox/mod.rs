//! Command sandbox - one long-lived container per workspace
//!
//! Commands are typed into a detached `screen` session inside the container,
//! so shell state (working directory, exported variables, activated
//! virtualenvs) carries over from one command to the next.
//!
//! - `config` - [`SandboxConfig`] and Docker Engine API payloads
//! - `docker` - [`DockerClient`], the Engine API over the Unix socket
//! - `image` - sandbox Dockerfile, hardening rules, build context
//! - `session` - [`SandboxSession`], the command runner

pub mod config;
pub mod docker;
pub mod image;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;

pub use config::SandboxConfig;
pub use docker::DockerClient;
pub use session::{ContainerHandle, OutputStream, SandboxSession};

/// Error type for sandbox operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// The container runtime cannot be reached
    Unavailable(String),
    /// The runtime answered with an error status
    Api { status: u16, message: String },
    /// Connection or protocol failure while talking to the runtime
    Transport(String),
    /// The sandbox image failed to build
    Image(String),
    /// A command did not print its end token in time
    Timeout(Duration),
    /// The task was cancelled while a command was running
    Cancelled,
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::Unavailable(msg) => write!(f, "Container runtime unavailable: {}", msg),
            SandboxError::Api { status, message } => {
                write!(f, "Container runtime error {}: {}", status, message)
            }
            SandboxError::Transport(msg) => write!(f, "Container runtime transport error: {}", msg),
            SandboxError::Image(msg) => write!(f, "Sandbox image build failed: {}", msg),
            SandboxError::Timeout(d) => {
                write!(f, "Command did not finish within {}s and was interrupted", d.as_secs())
            }
            SandboxError::Cancelled => write!(f, "Command cancelled"),
        }
    }
}

impl std::error::Error for SandboxError {}

/// A container found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub running: bool,
}

/// Everything needed to create the sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// `host:container` bind mounts
    pub binds: Vec<String>,
    pub working_dir: String,
    pub privileged: bool,
    pub auto_remove: bool,
    pub tty: bool,
}

/// The container operations the sandbox needs
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fails with [`SandboxError::Unavailable`] when the runtime is unreachable
    async fn ping(&self) -> Result<(), SandboxError>;

    /// Look up a container (running or not) by exact name
    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, SandboxError>;

    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError>;

    /// Build `image` from the given Dockerfile text
    async fn build_image(&self, image: &str, dockerfile: &str) -> Result<(), SandboxError>;

    /// Returns the new container id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError>;

    async fn start_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Stopping a container that is already gone is not an error
    async fn stop_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Removing a container that is already gone is not an error
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), SandboxError>;

    /// Run `cmd` in the container and return its output
    async fn exec(&self, id: &str, cmd: &[String]) -> Result<String, SandboxError>;
}
