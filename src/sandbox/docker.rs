//! Docker Engine API client
//!
//! Speaks HTTP/1.1 to the daemon over its Unix domain socket. Only the
//! handful of endpoints the sandbox needs are covered.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, StatusCode};
use hyper_util::client::legacy::Client;
use hyperlocal::UnixConnector;
use serde::Serialize;
use tracing::{debug, info};

use super::config::*;
use super::image::{build_context, SANDBOX_DOCKERFILE};
use super::{ContainerInfo, ContainerRuntime, ContainerSpec, SandboxError};

type HyperClient = Client<UnixConnector, Full<Bytes>>;

/// Client for the Docker daemon's control API
pub struct DockerClient {
    client: HyperClient,
    socket_path: String,
}

impl DockerClient {
    /// Create a new Docker API client
    ///
    /// # Arguments
    /// * `socket_path` - Path to the Docker daemon socket
    pub fn new(socket_path: impl Into<String>) -> Self {
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(UnixConnector);

        Self {
            client,
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Send one request and collect the whole response body
    async fn send_request(
        &self,
        method: Method,
        endpoint: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes), SandboxError> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, endpoint).into();

        let req = hyper::Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", content_type)
            .body(Full::new(body))
            .map_err(|e| SandboxError::Transport(e.to_string()))?;

        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| SandboxError::Transport(format!("{}: {}", endpoint, e)))?;
        let status = res.status();

        let body_bytes = res
            .into_body()
            .collect()
            .await
            .map_err(|e| SandboxError::Transport(format!("{}: {}", endpoint, e)))?
            .to_bytes();

        Ok((status, body_bytes))
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &T,
    ) -> Result<(StatusCode, Bytes), SandboxError> {
        let json = serde_json::to_vec(body).map_err(|e| SandboxError::Transport(e.to_string()))?;
        self.send_request(method, endpoint, "application/json", Bytes::from(json))
            .await
    }

    async fn send_empty(
        &self,
        method: Method,
        endpoint: &str,
    ) -> Result<(StatusCode, Bytes), SandboxError> {
        self.send_request(method, endpoint, "application/json", Bytes::new())
            .await
    }
}

/// Error for a non-success response, using the daemon's message when present
fn api_error(status: StatusCode, body: &[u8]) -> SandboxError {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    SandboxError::Api {
        status: status.as_u16(),
        message,
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, SandboxError> {
    serde_json::from_slice(body).map_err(|e| SandboxError::Transport(format!("unexpected response: {}", e)))
}

/// Join the stdout/stderr frames of a non-TTY attach stream
///
/// Each frame is an 8-byte header (stream type, 3 zero bytes, big-endian
/// length) followed by the payload. Unframed input is returned as is.
pub fn demux_stream(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while !rest.is_empty() {
        let framed = rest.len() >= 8 && rest[0] <= 2 && rest[1..4] == [0, 0, 0];
        if !framed {
            out.extend_from_slice(rest);
            break;
        }
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = (8 + len).min(rest.len());
        out.extend_from_slice(&rest[8..end]);
        rest = &rest[end..];
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> Result<(), SandboxError> {
        match self.send_empty(Method::GET, "/_ping").await {
            Ok((status, _)) if status.is_success() => Ok(()),
            Ok((status, body)) => Err(SandboxError::Unavailable(format!(
                "{} answered {}: {}",
                self.socket_path,
                status,
                String::from_utf8_lossy(&body).trim()
            ))),
            Err(e) => Err(SandboxError::Unavailable(format!("{}: {}", self.socket_path, e))),
        }
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>, SandboxError> {
        let filters = serde_json::json!({ "name": [format!("^/{}$", name)] }).to_string();
        let endpoint = format!(
            "/containers/json?all=true&filters={}",
            urlencoding::encode(&filters)
        );
        let (status, body) = self.send_empty(Method::GET, &endpoint).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let wanted = format!("/{}", name);
        let containers: Vec<ContainerSummary> = parse_json(&body)?;
        Ok(containers
            .into_iter()
            .find(|c| c.names.iter().any(|n| *n == wanted))
            .map(|c| ContainerInfo {
                running: c.state == "running",
                id: c.id,
            }))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, SandboxError> {
        let endpoint = format!("/images/{}/json", urlencoding::encode(image));
        let (status, body) = self.send_empty(Method::GET, &endpoint).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(api_error(s, &body)),
        }
    }

    async fn build_image(&self, image: &str, dockerfile: &str) -> Result<(), SandboxError> {
        info!(image, "Building sandbox image");
        let context = build_context(dockerfile)?;
        let endpoint = format!(
            "/build?t={}&dockerfile={}&rm=true",
            urlencoding::encode(image),
            urlencoding::encode(SANDBOX_DOCKERFILE)
        );
        let (status, body) = self
            .send_request(Method::POST, &endpoint, "application/x-tar", Bytes::from(context))
            .await?;
        if !status.is_success() {
            return Err(SandboxError::Image(api_error(status, &body).to_string()));
        }

        // The build reports failures in-band, one JSON object per line
        for line in String::from_utf8_lossy(&body).lines() {
            let progress: BuildProgress = match serde_json::from_str(line) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Some(error) = progress.error {
                return Err(SandboxError::Image(error));
            }
            if let Some(stream) = progress.stream {
                let stream = stream.trim();
                if !stream.is_empty() {
                    debug!(target: "sandpiper::sandbox::build", "{}", stream);
                }
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        let endpoint = format!("/containers/create?name={}", urlencoding::encode(&spec.name));
        let body = CreateContainer {
            image: spec.image.clone(),
            cmd: spec.cmd.clone(),
            tty: spec.tty,
            working_dir: spec.working_dir.clone(),
            host_config: HostConfig {
                binds: spec.binds.clone(),
                privileged: spec.privileged,
                auto_remove: spec.auto_remove,
            },
        };
        let (status, resp) = self.send_json(Method::POST, &endpoint, &body).await?;
        if !status.is_success() {
            return Err(api_error(status, &resp));
        }
        let created: IdResponse = parse_json(&resp)?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        let (status, body) = self
            .send_empty(Method::POST, &format!("/containers/{}/start", id))
            .await?;
        match status {
            s if s.is_success() || s == StatusCode::NOT_MODIFIED => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), SandboxError> {
        let (status, body) = self
            .send_empty(Method::POST, &format!("/containers/{}/stop", id))
            .await?;
        match status {
            s if s.is_success() || s == StatusCode::NOT_MODIFIED || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), SandboxError> {
        let endpoint = format!("/containers/{}?force={}", id, force);
        let (status, body) = self.send_empty(Method::DELETE, &endpoint).await?;
        match status {
            // 409: removal already in progress (auto-remove after stop)
            s if s.is_success() || s == StatusCode::NOT_FOUND || s == StatusCode::CONFLICT => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<String, SandboxError> {
        let create = ExecCreate {
            cmd: cmd.to_vec(),
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
        };
        let (status, body) = self
            .send_json(Method::POST, &format!("/containers/{}/exec", id), &create)
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        let exec: IdResponse = parse_json(&body)?;

        let start = ExecStart {
            detach: false,
            tty: false,
        };
        let (status, body) = self
            .send_json(Method::POST, &format!("/exec/{}/start", exec.id), &start)
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(demux_stream(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u8, payload: &str) -> Vec<u8> {
        let mut out = vec![kind, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload.as_bytes());
        out
    }

    #[test]
    fn test_demux_joins_frames() {
        let mut raw = frame(1, "hello ");
        raw.extend(frame(2, "warning\n"));
        raw.extend(frame(1, "world"));
        assert_eq!(demux_stream(&raw), "hello warning\nworld");
    }

    #[test]
    fn test_demux_passes_unframed_output() {
        assert_eq!(demux_stream(b"plain output\n"), "plain output\n");
        assert_eq!(demux_stream(b""), "");
    }

    #[test]
    fn test_api_error_prefers_daemon_message() {
        let err = api_error(StatusCode::CONFLICT, br#"{"message":"name in use"}"#);
        assert_eq!(
            err,
            SandboxError::Api {
                status: 409,
                message: "name in use".to_string()
            }
        );
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, b"boom\n");
        assert_eq!(err.to_string(), "Container runtime error 500: boom");
    }

    #[tokio::test]
    async fn test_ping_missing_socket_is_unavailable() {
        let client = DockerClient::new("/nonexistent/docker.sock");
        assert!(matches!(client.ping().await, Err(SandboxError::Unavailable(_))));
    }
}
