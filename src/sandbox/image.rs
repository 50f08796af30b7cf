//! Sandbox image: Dockerfile, network hardening, build context

use super::config::SCREEN_SESSION;
use super::SandboxError;

/// Name of the generated Dockerfile inside the build context
pub const SANDBOX_DOCKERFILE: &str = "Dockerfile-sandbox";

const SANDBOX_LAYERS: &[&str] = &[
    "RUN apt-get update && apt-get install -y iptables screen",
    "RUN update-alternatives --set iptables /usr/sbin/iptables-legacy",
    "RUN update-alternatives --set ip6tables /usr/sbin/ip6tables-legacy",
];

const BLOCKED_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// The workspace Dockerfile with the sandbox tooling layered on top
///
/// `base` is the workspace's own Dockerfile, if it has one.
pub fn sandbox_dockerfile(base: Option<&str>, fallback_image: &str) -> String {
    let mut dockerfile = match base {
        Some(text) if !text.trim().is_empty() => text.trim_end().to_string(),
        _ => format!("FROM {}", fallback_image),
    };
    for layer in SANDBOX_LAYERS {
        dockerfile.push('\n');
        dockerfile.push_str(layer);
    }
    dockerfile.push('\n');
    dockerfile
}

/// iptables rules applied when the container starts
///
/// Loopback is open; outbound TCP is limited to ports 80 and 443, and
/// plain-text HTTP requests other than reads are dropped.
pub fn hardening_script() -> String {
    let mut rules = vec!["iptables -A OUTPUT -o lo -j ACCEPT".to_string()];
    for method in BLOCKED_METHODS {
        rules.push(format!(
            "iptables -A OUTPUT -p tcp --dport 80 -m string --algo bm --string '{} ' -j DROP",
            method
        ));
    }
    rules.push("iptables -A OUTPUT -p tcp -m multiport ! --dports 80,443 -j DROP".to_string());
    rules.join(" && ")
}

/// Container command: harden, start the detached multiplexer, stay alive
pub fn container_command() -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!(
            "{} && screen -S {} -dm && sleep infinity",
            hardening_script(),
            SCREEN_SESSION
        ),
    ]
}

/// Tar archive holding only the sandbox Dockerfile
pub fn build_context(dockerfile: &str) -> Result<Vec<u8>, SandboxError> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, SANDBOX_DOCKERFILE, dockerfile.as_bytes())
        .map_err(|e| SandboxError::Image(format!("failed to pack build context: {}", e)))?;
    builder
        .into_inner()
        .map_err(|e| SandboxError::Image(format!("failed to pack build context: {}", e)))
}
