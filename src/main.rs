//! sandpiper - LLM coding agent with a Docker command sandbox
//!
//! ```text
//! sandpiper run "add a --verbose flag" --context src/cli.py
//! sandpiper restart-sandbox
//! sandpiper summary src/cli.py
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sandpiper::agent::{
    AbortReason, ConsoleNotifier, TaskConfig, TaskLoop, TaskRequest, TaskStatus,
};
use sandpiper::llm::{OllamaChat, OllamaConfig};
use sandpiper::sandbox::{SandboxConfig, SandboxSession};
use sandpiper::workspace::{summarize, FileStore, LocalFiles};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "sandpiper", version, about = "LLM coding agent with a sandboxed shell")]
struct Cli {
    /// Repository the agent works on
    #[arg(long, global = true, env = "SANDPIPER_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Docker Engine API socket
    #[arg(long, global = true, env = "DOCKER_SOCKET", default_value = "/var/run/docker.sock")]
    docker_socket: String,

    /// Export traces to this OTLP (gRPC) endpoint
    #[arg(long, global = true, env = "OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Print Prometheus metrics before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task to completion
    Run {
        /// What the agent should do
        task: String,

        /// Files whose summaries are sent with the task
        #[arg(long = "context", value_name = "PATH")]
        context: Vec<String>,

        /// Ollama model name
        #[arg(long, env = "SANDPIPER_MODEL", default_value = "qwen3")]
        model: String,

        /// Ollama server URL
        #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
        ollama_url: String,

        /// Conversation length at which the task gives up (even)
        #[arg(long, default_value_t = 40, value_parser = parse_message_ceiling)]
        max_messages: usize,

        /// Seconds a sandboxed command may run, 0 for no limit
        #[arg(long, env = "SANDPIPER_COMMAND_TIMEOUT", default_value_t = 600)]
        command_timeout: u64,

        /// Do not let the model run commands
        #[arg(long)]
        no_sandbox: bool,

        /// Print partial command output while it runs
        #[arg(long)]
        stream_output: bool,
    },
    /// Rebuild the sandbox image and drop the running container
    RestartSandbox,
    /// Print the summary the model would see for a file
    Summary {
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = sandpiper::tracing::init_tracing("sandpiper", cli.otlp_endpoint.as_deref()) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };

    if cli.print_metrics {
        print!("{}", sandpiper::metrics::render());
    }
    if cli.otlp_endpoint.is_some() {
        sandpiper::tracing::shutdown_tracing();
    }
    code
}

async fn run(cli: &Cli) -> Result<ExitCode, BoxError> {
    let workspace = std::fs::canonicalize(&cli.workspace)
        .map_err(|e| format!("{}: {}", cli.workspace.display(), e))?;

    match &cli.command {
        Command::Run {
            task,
            context,
            model,
            ollama_url,
            max_messages,
            command_timeout,
            no_sandbox,
            stream_output,
        } => {
            let chat = OllamaChat::new(OllamaConfig {
                url: ollama_url.clone(),
                model: model.clone(),
                ..Default::default()
            });
            let config = TaskConfig {
                max_messages: *max_messages,
                ..Default::default()
            };
            let notifier = ConsoleNotifier {
                show_partials: *stream_output,
            };

            let mut task_loop = TaskLoop::new(
                Arc::new(chat),
                Arc::new(LocalFiles::new(&workspace)),
                Arc::new(notifier),
                config,
            )
            .with_workspace(&workspace);

            if !no_sandbox {
                let timeout = match command_timeout {
                    0 => None,
                    secs => Some(Duration::from_secs(*secs)),
                };
                task_loop = task_loop.with_sandbox(Arc::new(sandbox_session(
                    &workspace,
                    &cli.docker_socket,
                    timeout,
                )));
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling task");
                    on_signal.cancel();
                }
            });

            println!("[AGENT] Workspace: {}", workspace.display());
            println!("[AGENT] Model: {}", model);
            let request = TaskRequest::new(task.clone()).with_context(context.clone());
            let outcome = task_loop.run(request, &cancel).await?;

            match &outcome.status {
                TaskStatus::Completed { final_message } => {
                    println!("\n{}", final_message);
                    for summary in &outcome.applied {
                        println!("  edited {} ({} lines)", summary.path, summary.line_count);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                TaskStatus::Aborted(AbortReason::MessageCeiling) => {
                    println!(
                        "\nTask not completed: conversation reached {} messages",
                        outcome.messages.len()
                    );
                    Ok(ExitCode::from(2))
                }
                TaskStatus::Aborted(AbortReason::ParseFailure { error, .. }) => {
                    println!("\nTask not completed: the model's reply could not be parsed ({})", error);
                    Ok(ExitCode::from(2))
                }
            }
        }
        Command::RestartSandbox => {
            let session = sandbox_session(&workspace, &cli.docker_socket, None);
            session.restart().await?;
            info!("Sandbox restarted");
            println!("[SANDBOX] Image rebuilt; the next command starts a fresh container");
            Ok(ExitCode::SUCCESS)
        }
        Command::Summary { path } => {
            let files = LocalFiles::new(&workspace);
            let content = files
                .read(path)
                .await
                .map_err(|e| format!("{}: {}", path, e))?;
            println!("{}", summarize(path, &content));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_message_ceiling(value: &str) -> Result<usize, String> {
    let max: usize = value.parse().map_err(|e| format!("{}", e))?;
    TaskConfig {
        max_messages: max,
        ..Default::default()
    }
    .check()?;
    Ok(max)
}

fn sandbox_session(workspace: &Path, socket: &str, timeout: Option<Duration>) -> SandboxSession {
    let config = SandboxConfig {
        socket_path: socket.to_string(),
        command_timeout: timeout,
        ..Default::default()
    };
    SandboxSession::docker(workspace, config)
}
