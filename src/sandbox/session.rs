//! Sandbox session - runs commands in the persistent container
//!
//! A command is typed into the `screen` pane with its output redirected to a
//! capture file, followed by an `echo` of a random end token. The session
//! then reads the capture file until the token shows up.
//!
//! ```text
//! stuff: "<cmd> > /tmp/sandbox-<id>.out 2>&1; echo <token> >> /tmp/sandbox-<id>.out\n"
//!                              │
//!            poll: cat capture ┴─► token? ─yes─► output before token
//!                                     │no
//!                                     └─► partial output to observer, sleep, retry
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::config::{SandboxConfig, SCREEN_SESSION};
use super::docker::DockerClient;
use super::image::{container_command, sandbox_dockerfile};
use super::{ContainerRuntime, ContainerSpec, SandboxError};
use crate::metrics::SANDBOX_COMMAND_DURATION;

const DEFAULT_STREAM: &str = "default";

/// The running session container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

type PartialCallback<'a> = Box<dyn Fn(&str) + Send + Sync + 'a>;

/// Identifies where a command's output goes while it is running
///
/// The id selects the capture file; the optional callback receives the
/// output captured so far on every poll.
pub struct OutputStream<'a> {
    id: String,
    on_partial: Option<PartialCallback<'a>>,
}

impl<'a> OutputStream<'a> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            on_partial: None,
        }
    }

    pub fn observe(mut self, callback: impl Fn(&str) + Send + Sync + 'a) -> Self {
        self.on_partial = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn forward(&self, text: &str) {
        if let Some(callback) = &self.on_partial {
            callback(text);
        }
    }
}

/// Escape a command for `screen -X stuff`
pub fn escape_for_stuff(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len());
    for c in command.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '$' => escaped.push_str("\\$"),
            '^' => escaped.push_str("\\^"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Capture file for a stream id: `<dir>/sandbox-<first 16 hex of sha256>.out`
pub fn capture_path(dir: &Path, stream_id: &str) -> PathBuf {
    let digest = Sha256::digest(stream_id.as_bytes());
    let hex = hex::encode(digest);
    dir.join(format!("sandbox-{}.out", &hex[..16]))
}

/// One persistent sandbox per workspace
pub struct SandboxSession {
    runtime: Arc<dyn ContainerRuntime>,
    config: SandboxConfig,
    workspace: PathBuf,
    handle: Mutex<Option<ContainerHandle>>,
}

impl SandboxSession {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        workspace: impl Into<PathBuf>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            runtime,
            config,
            workspace: workspace.into(),
            handle: Mutex::new(None),
        }
    }

    /// Session backed by the Docker daemon at `config.socket_path`
    pub fn docker(workspace: impl Into<PathBuf>, config: SandboxConfig) -> Self {
        let runtime = Arc::new(DockerClient::new(config.socket_path.clone()));
        Self::new(runtime, workspace, config)
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Make sure the session container is running, creating it if needed
    pub async fn ensure_session(&self) -> Result<ContainerHandle, SandboxError> {
        let mut slot = self.handle.lock().await;
        self.ensure_locked(&mut slot).await
    }

    async fn ensure_locked(
        &self,
        slot: &mut Option<ContainerHandle>,
    ) -> Result<ContainerHandle, SandboxError> {
        self.runtime.ping().await?;

        let name = self.config.container_name.clone();
        if let Some(existing) = self.runtime.find_container(&name).await? {
            if existing.running {
                let handle = ContainerHandle {
                    id: existing.id,
                    name,
                };
                if slot.as_ref() != Some(&handle) {
                    debug!(container = %handle.id, "Reusing running sandbox container");
                }
                *slot = Some(handle.clone());
                return Ok(handle);
            }
            info!(container = %existing.id, "Removing stopped sandbox container");
            self.runtime.remove_container(&existing.id, true).await?;
        }
        *slot = None;

        if !self.runtime.image_exists(&self.config.image).await? {
            self.build_image().await?;
        }

        let id = self.runtime.create_container(&self.container_spec()).await?;
        self.runtime.start_container(&id).await?;
        println!("[SANDBOX] Started container {} ({})", name, short_id(&id));
        info!(container = %id, image = %self.config.image, "Sandbox container started");

        tokio::time::sleep(self.config.startup_delay).await;

        let handle = ContainerHandle { id, name };
        *slot = Some(handle.clone());
        Ok(handle)
    }

    fn container_spec(&self) -> ContainerSpec {
        let ws = self.workspace.to_string_lossy().into_owned();
        ContainerSpec {
            name: self.config.container_name.clone(),
            image: self.config.image.clone(),
            cmd: container_command(),
            binds: vec![format!("{}:{}", ws, ws)],
            working_dir: ws,
            privileged: true,
            auto_remove: true,
            tty: true,
        }
    }

    async fn build_image(&self) -> Result<(), SandboxError> {
        let path = self.config.dockerfile_path(&self.workspace);
        let base = match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No base Dockerfile, using fallback image");
                None
            }
            Err(e) => {
                return Err(SandboxError::Image(format!("{}: {}", path.display(), e)));
            }
        };
        let dockerfile = sandbox_dockerfile(base.as_deref(), &self.config.fallback_base_image);
        println!("[SANDBOX] Building image {}", self.config.image);
        self.runtime.build_image(&self.config.image, &dockerfile).await
    }

    /// Rebuild the image and drop the current container
    ///
    /// The next command creates a fresh container.
    pub async fn restart(&self) -> Result<(), SandboxError> {
        let mut slot = self.handle.lock().await;
        self.runtime.ping().await?;
        self.build_image().await?;

        if let Some(existing) = self.runtime.find_container(&self.config.container_name).await? {
            info!(container = %existing.id, "Stopping sandbox container");
            self.runtime.stop_container(&existing.id).await?;
            self.runtime.remove_container(&existing.id, true).await?;
        }
        *slot = None;
        Ok(())
    }

    /// Run one command in the session
    pub async fn run(
        &self,
        command: &str,
        stream: Option<&OutputStream<'_>>,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        let mut slot = self.handle.lock().await;
        let handle = self.ensure_locked(&mut slot).await?;
        self.run_in(&handle, command, stream, cancel).await
    }

    /// Run commands in order from the workspace directory
    ///
    /// Returns `"> <command>\n<output>\n\n"` for every non-empty command.
    /// The session is held for the whole batch.
    pub async fn run_commands(
        &self,
        commands: &[String],
        stream: Option<&OutputStream<'_>>,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        let mut slot = self.handle.lock().await;
        let handle = self.ensure_locked(&mut slot).await?;

        let cd = format!("cd {}", self.workspace.to_string_lossy());
        self.run_in(&handle, &cd, stream, cancel).await?;

        let mut output = String::new();
        for command in commands.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            let result = self.run_in(&handle, command, stream, cancel).await?;
            output.push_str(&format!("> {}\n{}\n\n", command, result));
        }
        Ok(output)
    }

    async fn run_in(
        &self,
        handle: &ContainerHandle,
        command: &str,
        stream: Option<&OutputStream<'_>>,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        let span = info_span!("sandbox_command", command = %command, container = %short_id(&handle.id));
        async {
            let started = Instant::now();
            let stream_id = stream.map(|s| s.id()).unwrap_or(DEFAULT_STREAM);
            let capture = capture_path(&self.config.capture_dir, stream_id)
                .to_string_lossy()
                .into_owned();
            let token = Uuid::new_v4().simple().to_string();

            self.runtime
                .exec(&handle.id, &["rm".to_string(), "-f".to_string(), capture.clone()])
                .await?;

            let line = stuffed_line(&escape_for_stuff(command), &capture, &token);
            self.stuff(handle, &line).await?;

            let result = self.wait_for_token(handle, &capture, &token, stream, cancel).await;
            SANDBOX_COMMAND_DURATION.observe(started.elapsed().as_secs_f64());

            if let Err(e) = &result {
                warn!(error = %e, "Sandbox command did not complete");
                // Free the pane for the next command
                if let Err(e) = self.stuff(handle, "^C").await {
                    debug!(error = %e, "Failed to interrupt sandbox command");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stuff(&self, handle: &ContainerHandle, text: &str) -> Result<(), SandboxError> {
        let cmd = [
            "screen".to_string(),
            "-S".to_string(),
            SCREEN_SESSION.to_string(),
            "-X".to_string(),
            "stuff".to_string(),
            text.to_string(),
        ];
        self.runtime.exec(&handle.id, &cmd).await.map(|_| ())
    }

    async fn wait_for_token(
        &self,
        handle: &ContainerHandle,
        capture: &str,
        token: &str,
        stream: Option<&OutputStream<'_>>,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        let deadline = self.config.command_timeout.map(|t| (t, Instant::now() + t));
        let cat = [
            "sh".to_string(),
            "-c".to_string(),
            format!("cat {} 2>/dev/null", capture),
        ];

        loop {
            let captured = self.runtime.exec(&handle.id, &cat).await?;
            if let Some(end) = captured.find(token) {
                return Ok(captured[..end].to_string());
            }
            if let Some(stream) = stream {
                stream.forward(&captured);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Some((timeout, at)) = deadline {
                if Instant::now() >= at {
                    return Err(SandboxError::Timeout(timeout));
                }
            }
        }
    }
}

/// Line typed into the pane for one command
///
/// The command runs as a group in the pane's own shell so `cd` and `export`
/// persist and every part of `a; b` or `a && b` is captured. The newline
/// before `}` closes any trailing `# comment`.
pub(crate) fn stuffed_line(command: &str, capture: &str, token: &str) -> String {
    format!(
        "{{ {}\n}} > {} 2>&1; echo {} >> {}\n",
        command, capture, token, capture
    )
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_for_stuff() {
        assert_eq!(escape_for_stuff("echo $HOME"), "echo \\$HOME");
        assert_eq!(escape_for_stuff(r"printf 'a\n'"), r"printf 'a\\n'");
        assert_eq!(escape_for_stuff("grep ^fn"), "grep \\^fn");
        assert_eq!(escape_for_stuff("ls -la"), "ls -la");
    }

    #[test]
    fn test_capture_path_is_stable_per_stream() {
        let dir = Path::new("/tmp");
        let a = capture_path(dir, "1700000000.3");
        assert_eq!(a, capture_path(dir, "1700000000.3"));
        assert_ne!(a, capture_path(dir, "1700000000.5"));

        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sandbox-") && name.ends_with(".out"));
        assert_eq!(name.len(), "sandbox-".len() + 16 + ".out".len());
    }

    #[tokio::test]
    async fn test_docker_session_uses_configured_socket() {
        let config = SandboxConfig {
            socket_path: "/nonexistent/sandpiper-test.sock".to_string(),
            ..Default::default()
        };
        let session = SandboxSession::docker("/tmp", config);

        match session.ensure_session().await {
            Err(SandboxError::Unavailable(message)) => {
                assert!(message.contains("/nonexistent/sandpiper-test.sock"), "{}", message)
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_stuffed_line_groups_the_command() {
        let line = stuffed_line("cd src && ls # look", "/tmp/c.out", "tok");
        assert_eq!(
            line,
            "{ cd src && ls # look\n} > /tmp/c.out 2>&1; echo tok >> /tmp/c.out\n"
        );
    }

    #[test]
    fn test_output_stream_forwards_partials() {
        let seen = std::sync::Mutex::new(Vec::new());
        let stream = OutputStream::new("s").observe(|text| seen.lock().unwrap().push(text.to_string()));
        stream.forward("part");
        assert_eq!(stream.id(), "s");
        drop(stream);
        assert_eq!(seen.into_inner().unwrap(), vec!["part".to_string()]);
    }
}
