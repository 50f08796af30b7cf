//! Fakes for exercising the agent without Docker or a model server
//!
//! - [`ShellRuntime`] - a [`ContainerRuntime`] whose "container" is a local
//!   `sh` process; stuffed lines are written to its stdin, other exec calls
//!   run as local commands
//! - [`RecordingNotifier`] - keeps every notification for assertions

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::agent::Notifier;
use crate::llm::Role;
use crate::sandbox::{ContainerInfo, ContainerRuntime, ContainerSpec, SandboxError};

#[derive(Debug, Default)]
struct Containers {
    images: HashSet<String>,
    by_name: HashMap<String, ContainerInfo>,
    next_id: usize,
}

/// Local-shell stand-in for the container runtime
#[derive(Debug)]
pub struct ShellRuntime {
    available: bool,
    state: StdMutex<Containers>,
    shell: Mutex<Option<Child>>,
    calls: StdMutex<Vec<String>>,
}

impl Default for ShellRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRuntime {
    pub fn new() -> Self {
        Self {
            available: true,
            state: StdMutex::new(Containers::default()),
            shell: Mutex::new(None),
            calls: StdMutex::new(Vec::new()),
        }
    }

    /// A runtime whose ping always fails
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Pretend the image was built earlier
    pub fn with_image(self, image: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.images.insert(image.to_string());
        }
        self
    }

    /// Runtime operations so far ("ping", "build", "create", ...), exec excluded
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| *c == op).count()
    }

    /// Mark a container as exited, as if its process died
    pub fn kill(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(info) = state.by_name.get_mut(name) {
                info.running = false;
            }
        }
    }

    fn record(&self, op: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op.to_string());
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut Containers) -> T) -> Result<T, SandboxError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SandboxError::Transport("runtime state poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    async fn type_into_shell(&self, text: &str) -> Result<(), SandboxError> {
        let mut shell = self.shell.lock().await;
        if text == "^C" {
            if let Some(mut child) = shell.take() {
                let _ = child.kill().await;
            }
            return Ok(());
        }

        if shell.is_none() {
            let child = Command::new("sh")
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| SandboxError::Transport(format!("failed to spawn sh: {}", e)))?;
            *shell = Some(child);
        }

        let stdin = shell
            .as_mut()
            .and_then(|child| child.stdin.as_mut())
            .ok_or_else(|| SandboxError::Transport("shell has no stdin".to_string()))?;
        stdin
            .write_all(unescape_stuff(text).as_bytes())
            .await
            .map_err(|e| SandboxError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SandboxError::Transport(e.to_string()))
    }
}

/// Undo the escaping `screen -X stuff` removes before typing
fn unescape_stuff(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[async_trait]
impl ContainerRuntime for ShellRuntime {
    async fn ping(&self) -> Result<(), SandboxError> {
        self.record("ping");
        if self.available {
            Ok(())
        } else {
            Err(SandboxError::Unavailable("shell runtime switched off".to_string()))
        }
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, SandboxError> {
        self.with_state(|s| s.by_name.get(name).cloned())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError> {
        self.with_state(|s| s.images.contains(image))
    }

    async fn build_image(&self, image: &str, dockerfile: &str) -> Result<(), SandboxError> {
        self.record("build");
        if !dockerfile.contains("screen") {
            return Err(SandboxError::Image("screen is not installed".to_string()));
        }
        self.with_state(|s| {
            s.images.insert(image.to_string());
        })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        self.record("create");
        self.with_state(|s| {
            if !s.images.contains(&spec.image) {
                return Err(SandboxError::Api {
                    status: 404,
                    message: format!("No such image: {}", spec.image),
                });
            }
            if s.by_name.contains_key(&spec.name) {
                return Err(SandboxError::Api {
                    status: 409,
                    message: format!("name {} is already in use", spec.name),
                });
            }
            s.next_id += 1;
            let id = format!("shell{:08}", s.next_id);
            s.by_name.insert(
                spec.name.clone(),
                ContainerInfo {
                    id: id.clone(),
                    running: false,
                },
            );
            Ok(id)
        })?
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.record("start");
        self.with_state(|s| {
            for info in s.by_name.values_mut() {
                if info.id == id {
                    info.running = true;
                }
            }
        })
    }

    async fn stop_container(&self, id: &str) -> Result<(), SandboxError> {
        self.record("stop");
        self.with_state(|s| {
            for info in s.by_name.values_mut() {
                if info.id == id {
                    info.running = false;
                }
            }
        })
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), SandboxError> {
        self.record("remove");
        self.with_state(|s| s.by_name.retain(|_, info| info.id != id))
    }

    async fn exec(&self, _id: &str, cmd: &[String]) -> Result<String, SandboxError> {
        if cmd.len() >= 6 && cmd[0] == "screen" && cmd[4] == "stuff" {
            self.type_into_shell(&cmd[5]).await?;
            return Ok(String::new());
        }

        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| SandboxError::Transport("empty exec command".to_string()))?;
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SandboxError::Transport(format!("{}: {}", program, e)))?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Keeps every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: StdMutex<Vec<(Role, String, String)>>,
    partials: StdMutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(role, content, id)` of every notified message
    pub fn messages(&self) -> Vec<(Role, String, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// `(stream_id, text)` of every partial output
    pub fn partials(&self) -> Vec<(String, String)> {
        self.partials.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, role: Role, content: &str, id: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((role, content.to_string(), id.to_string()));
        }
    }

    fn stream_partial(&self, stream_id: &str, text: &str) {
        if let Ok(mut partials) = self.partials.lock() {
            partials.push((stream_id.to_string(), text.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_reverses_stuff_escaping() {
        let original = r"echo $HOME \ ^x";
        let escaped = crate::sandbox::session::escape_for_stuff(original);
        assert_eq!(unescape_stuff(&escaped), original);
    }
}
