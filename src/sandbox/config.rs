//! Sandbox configuration and Docker Engine API payloads
//!
//! The payload structs mirror the JSON bodies of the Engine API endpoints
//! used by [`DockerClient`](super::DockerClient).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the `screen` session commands are typed into
pub const SCREEN_SESSION: &str = "sandbox";

/// Configuration for the sandbox container
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Docker Engine API socket
    pub socket_path: String,
    /// Tag of the sandbox image
    pub image: String,
    /// Fixed name of the session container
    pub container_name: String,
    /// Dockerfile the sandbox image extends (`<workspace>/Dockerfile` when unset)
    pub base_dockerfile: Option<PathBuf>,
    /// Image used when there is no base Dockerfile
    pub fallback_base_image: String,
    /// Directory inside the container holding per-stream capture files
    pub capture_dir: PathBuf,
    /// Pause between reads of the capture file
    pub poll_interval: Duration,
    /// Time given to `screen` to come up after the container starts
    pub startup_delay: Duration,
    /// Per-command deadline, `None` waits forever
    pub command_timeout: Option<Duration>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            socket_path: "/var/run/docker.sock".to_string(),
            image: "sandpiper-sandbox:latest".to_string(),
            container_name: "sandpiper-sandbox".to_string(),
            base_dockerfile: None,
            fallback_base_image: "ubuntu:22.04".to_string(),
            capture_dir: PathBuf::from("/tmp"),
            poll_interval: Duration::from_secs(1),
            startup_delay: Duration::from_secs(1),
            command_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl SandboxConfig {
    /// Dockerfile the sandbox image is built from
    pub fn dockerfile_path(&self, workspace: &Path) -> PathBuf {
        self.base_dockerfile
            .clone()
            .unwrap_or_else(|| workspace.join("Dockerfile"))
    }
}

/// Body of `POST /containers/create`
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainer {
    pub image: String,
    pub cmd: Vec<String>,
    pub tty: bool,
    pub working_dir: String,
    pub host_config: HostConfig,
}

/// Host-side settings of a container
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub binds: Vec<String>,
    pub privileged: bool,
    pub auto_remove: bool,
}

/// Response of `POST /containers/create` and `POST /containers/{id}/exec`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    pub id: String,
}

/// One entry of `GET /containers/json`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub state: String,
}

/// Body of `POST /containers/{id}/exec`
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ExecCreate {
    pub cmd: Vec<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

/// Body of `POST /exec/{id}/start`
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ExecStart {
    pub detach: bool,
    pub tty: bool,
}

/// One progress line of `POST /build`
#[derive(Deserialize, Debug, Clone, Default)]
pub struct BuildProgress {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body returned by the Engine API
#[derive(Deserialize, Debug, Clone)]
pub struct ApiMessage {
    pub message: String,
}
