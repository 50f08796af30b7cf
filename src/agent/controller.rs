//! Task loop - drives one conversation with the model to completion
//!
//! ```text
//! Init ──► AwaitingAction ──► Executing ──► AwaitingAction ──► … ──► Done
//!               │                                   │
//!               └── message ceiling / parse failure ┴──► Aborted
//! ```
//!
//! Each round appends exactly two messages: the model's raw reply and the
//! environment's response to the action it asked for.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::edits::{EditError, EditStaging, DEFAULT_PREVIEW_CONTEXT};
use crate::llm::{ChatError, ChatMessage, ChatModel, Role};
use crate::metrics::{ACTIONS_TOTAL, LLM_CALL_DURATION, PARSE_FAILURES, TASKS_TOTAL};
use crate::protocol::{check_semantics, parse, Action};
use crate::sandbox::{OutputStream, SandboxError, SandboxSession};
use crate::workspace::{context_listing, summarize, view_section, FileStore, FileSummary};

use super::notify::Notifier;
use super::prompt::{parse_retry_message, system_prompt};

/// Configuration for the task loop
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Conversation length at which the task stops without completing
    ///
    /// Rounds add two messages each, so this must be even.
    pub max_messages: usize,
    /// Extra attempts after a reply fails to parse
    pub parse_retries: usize,
    /// Context lines around the new content in edit previews
    pub preview_context: usize,
    /// Most files listed in the initial context
    pub context_limit: usize,
}

impl TaskConfig {
    /// Reject settings the loop cannot honour exactly
    pub fn check(&self) -> Result<(), String> {
        if self.max_messages < 2 || self.max_messages % 2 != 0 {
            return Err(format!(
                "max_messages must be an even number of at least 2, got {}",
                self.max_messages
            ));
        }
        Ok(())
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_messages: 40,
            parse_retries: 4,
            preview_context: DEFAULT_PREVIEW_CONTEXT,
            context_limit: 200,
        }
    }
}

/// What the user asked for
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub description: String,
    /// Files whose summaries go into the initial context
    pub context_paths: Vec<String>,
    /// Executed as the first round without asking the model
    pub seed: Option<Action>,
}

impl TaskRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.context_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_seed(mut self, action: Action) -> Self {
        self.seed = Some(action);
        self
    }
}

/// Why a task stopped without completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The conversation reached `max_messages`
    MessageCeiling,
    /// The model kept replying with text the parser rejects
    ParseFailure { raw: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Completed { final_message: String },
    Aborted(AbortReason),
}

/// Result of a task run
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Unique trace ID for this run
    pub trace_id: String,
    pub status: TaskStatus,
    /// The whole conversation
    pub messages: Vec<ChatMessage>,
    /// Rounds executed, seed round included
    pub rounds: usize,
    /// Summaries of files written by this task
    pub applied: Vec<FileSummary>,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TaskStatus::Completed { .. })
    }

    pub fn final_message(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Completed { final_message } => Some(final_message),
            TaskStatus::Aborted(_) => None,
        }
    }
}

/// Error type that ends a task
#[derive(Debug)]
pub enum TaskError {
    /// The model call failed after the client's own retries
    Model(ChatError),
    /// The cancellation token fired
    Cancelled,
    /// The loop was configured with settings it cannot honour
    Config(String),
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Model(e) => write!(f, "Model error: {}", e),
            TaskError::Cancelled => write!(f, "Task cancelled"),
            TaskError::Config(reason) => write!(f, "Invalid task configuration: {}", reason),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Model(e) => Some(e),
            TaskError::Cancelled | TaskError::Config(_) => None,
        }
    }
}

impl From<ChatError> for TaskError {
    fn from(e: ChatError) -> Self {
        TaskError::Model(e)
    }
}

/// A failed action; reported back to the model, the task goes on
#[derive(Debug)]
pub enum ActionError {
    /// The action is well-formed but makes no sense (empty path, bad range)
    Invalid(String),
    Edit(EditError),
    Sandbox(SandboxError),
    Io { path: String, source: std::io::Error },
    /// No sandbox was configured for this task
    SandboxDisabled,
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::Invalid(msg) => write!(f, "Invalid action: {}", msg),
            ActionError::Edit(e) => write!(f, "{}", e),
            ActionError::Sandbox(e) => write!(f, "{}", e),
            ActionError::Io { path, source } => write!(f, "{}: {}", path, source),
            ActionError::SandboxDisabled => write!(f, "Running commands is disabled for this task"),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<EditError> for ActionError {
    fn from(e: EditError) -> Self {
        ActionError::Edit(e)
    }
}

impl From<SandboxError> for ActionError {
    fn from(e: SandboxError) -> Self {
        ActionError::Sandbox(e)
    }
}

/// Dotted message ids: `<root>`, `<root>.1`, `<root>.1.2`, ...
///
/// Every id extends the previous one, so display code can order and nest
/// messages without a separate index.
#[derive(Debug, Clone)]
pub struct MessageIds {
    root: String,
    current: String,
    seq: u64,
}

impl MessageIds {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            current: root.clone(),
            root,
            seq: 0,
        }
    }

    /// Root derived from the current time in milliseconds
    pub fn from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self::new(millis.to_string())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn next(&mut self) -> String {
        self.seq += 1;
        self.current = format!("{}.{}", self.current, self.seq);
        self.current.clone()
    }
}

enum Dispatched {
    Output(String),
    Completed {
        final_message: String,
        applied: Vec<FileSummary>,
    },
}

/// Result of executing one action
struct Executed {
    response: String,
    completed: Option<(String, Vec<FileSummary>)>,
}

/// Orchestrates the model, the workspace files and the sandbox
pub struct TaskLoop {
    model: Arc<dyn ChatModel>,
    files: Arc<dyn FileStore>,
    sandbox: Option<Arc<SandboxSession>>,
    notifier: Arc<dyn Notifier>,
    workspace: Option<PathBuf>,
    config: TaskConfig,
}

impl TaskLoop {
    /// Create a task loop
    ///
    /// # Arguments
    /// * `model` - produces the model's replies
    /// * `files` - workspace files read and edited by the task
    /// * `notifier` - receives every message and partial command output
    /// * `config` - loop limits
    pub fn new(
        model: Arc<dyn ChatModel>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        config: TaskConfig,
    ) -> Self {
        Self {
            model,
            files,
            sandbox: None,
            notifier,
            workspace: None,
            config,
        }
    }

    /// Allow `runCommand` in this sandbox
    pub fn with_sandbox(mut self, sandbox: Arc<SandboxSession>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// List files under `root` in the initial context
    pub fn with_workspace(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace = Some(root.into());
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Run one task until the model completes it, the loop gives up, or
    /// `cancel` fires
    pub async fn run(
        &self,
        request: TaskRequest,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, TaskError> {
        self.config.check().map_err(TaskError::Config)?;
        let trace_id = Uuid::now_v7().to_string();

        let root_span = info_span!(
            "agent_task",
            trace_id = %trace_id,
            model = %self.model.model_name(),
            otel.name = "agent_task"
        );

        let result = self
            .run_conversation(request, trace_id, cancel)
            .instrument(root_span)
            .await;

        let outcome_label = match &result {
            Ok(outcome) => match &outcome.status {
                TaskStatus::Completed { .. } => "completed",
                TaskStatus::Aborted(AbortReason::MessageCeiling) => "message_ceiling",
                TaskStatus::Aborted(AbortReason::ParseFailure { .. }) => "parse_failure",
            },
            Err(TaskError::Cancelled) => "cancelled",
            Err(TaskError::Model(_)) => "model_error",
            Err(TaskError::Config(_)) => "invalid_config",
        };
        TASKS_TOTAL.with_label_values(&[outcome_label]).inc();
        result
    }

    async fn run_conversation(
        &self,
        request: TaskRequest,
        trace_id: String,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, TaskError> {
        info!(trace_id = %trace_id, task = %request.description, "Starting agent task");
        println!("[AGENT] Trace ID: {}", trace_id);

        let mut ids = MessageIds::from_clock();
        let mut messages: Vec<ChatMessage> = Vec::new();
        let mut staging = EditStaging::new(self.config.preview_context);
        let mut rounds = 0;

        let root_id = ids.root().to_string();
        self.append(&mut messages, ChatMessage::system(system_prompt()), root_id);

        let context = self.initial_context(&request).await;
        let user = json!({ "request": request.description, "context": context });
        let user_id = ids.next();
        self.append(&mut messages, ChatMessage::user(user.to_string()), user_id);

        if let Some(seed) = &request.seed {
            debug!(action = %seed.kind(), "Executing seed action");
            let assistant_id = ids.next();
            self.append(&mut messages, ChatMessage::assistant(seed.to_wire()), assistant_id);
            let env_id = ids.next();
            let executed = self.execute(seed, &mut staging, &env_id, cancel).await?;
            self.append(&mut messages, ChatMessage::system(executed.response), env_id);
            rounds += 1;
            if let Some((final_message, applied)) = executed.completed {
                return Ok(self.finish(trace_id, messages, rounds, final_message, applied));
            }
        }

        loop {
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            if messages.len() + 2 > self.config.max_messages {
                warn!(trace_id = %trace_id, messages = messages.len(), "Message ceiling reached");
                println!("[AGENT] Stopping: conversation reached {} messages", messages.len());
                return Ok(TaskOutcome {
                    trace_id,
                    status: TaskStatus::Aborted(AbortReason::MessageCeiling),
                    messages,
                    rounds,
                    applied: Vec::new(),
                });
            }

            let (raw, action) = match self.complete_and_parse(&messages, &mut ids, cancel).await? {
                Ok(parsed) => parsed,
                Err((raw, error)) => {
                    warn!(trace_id = %trace_id, error = %error, "Giving up on unparseable replies");
                    println!("[AGENT] Stopping: model reply could not be parsed ({})", error);
                    return Ok(TaskOutcome {
                        trace_id,
                        status: TaskStatus::Aborted(AbortReason::ParseFailure { raw, error }),
                        messages,
                        rounds,
                        applied: Vec::new(),
                    });
                }
            };

            let assistant_id = ids.next();
            self.append(&mut messages, ChatMessage::assistant(raw), assistant_id);

            let env_id = ids.next();
            let executed = self.execute(&action, &mut staging, &env_id, cancel).await?;
            self.append(&mut messages, ChatMessage::system(executed.response), env_id);
            rounds += 1;

            if let Some((final_message, applied)) = executed.completed {
                return Ok(self.finish(trace_id, messages, rounds, final_message, applied));
            }
        }
    }

    fn finish(
        &self,
        trace_id: String,
        messages: Vec<ChatMessage>,
        rounds: usize,
        final_message: String,
        applied: Vec<FileSummary>,
    ) -> TaskOutcome {
        info!(trace_id = %trace_id, rounds, files = applied.len(), "Agent task completed");
        println!("[AGENT] ✅ Task completed after {} rounds", rounds);
        TaskOutcome {
            trace_id,
            status: TaskStatus::Completed { final_message },
            messages,
            rounds,
            applied,
        }
    }

    fn append(&self, messages: &mut Vec<ChatMessage>, message: ChatMessage, id: String) {
        let message = message.with_id(id);
        self.notifier.notify(message.role, &message.content, &message.id);
        messages.push(message);
    }

    /// Workspace file listing plus summaries of the requested files
    async fn initial_context(&self, request: &TaskRequest) -> serde_json::Value {
        let files = match &self.workspace {
            Some(root) => context_listing(root, self.config.context_limit).await,
            None => Vec::new(),
        };

        let summaries = join_all(request.context_paths.iter().map(|path| async move {
            match self.files.read(path).await {
                Ok(content) => summarize(path, &content).to_string(),
                Err(e) => format!("{}: {}", path, e),
            }
        }))
        .await;

        json!({ "files": files, "summaries": summaries })
    }

    /// Ask the model for the next action, re-asking on a scratch copy of the
    /// conversation while replies fail to parse
    ///
    /// The inner `Err` carries the last raw reply and its parse error once
    /// the retry budget is spent.
    async fn complete_and_parse(
        &self,
        messages: &[ChatMessage],
        ids: &mut MessageIds,
        cancel: &CancellationToken,
    ) -> Result<Result<(String, Action), (String, String)>, TaskError> {
        let mut scratch = messages.to_vec();
        let mut attempt = 0;

        loop {
            let raw = self.call_model(&scratch, cancel).await?;
            let error = match parse(&raw) {
                Ok(action) => return Ok(Ok((raw, action))),
                Err(e) => e.to_string(),
            };

            PARSE_FAILURES.inc();
            warn!(attempt, error = %error, "Model reply could not be parsed");
            if attempt >= self.config.parse_retries {
                return Ok(Err((raw, error)));
            }
            attempt += 1;

            let reply_id = ids.next();
            scratch.push(ChatMessage::assistant(raw).with_id(reply_id.clone()));
            self.notifier.notify(Role::Assistant, &scratch[scratch.len() - 1].content, &reply_id);

            let retry_id = ids.next();
            let retry = parse_retry_message(&error);
            self.notifier.notify(Role::System, &retry, &retry_id);
            scratch.push(ChatMessage::system(retry).with_id(retry_id));
        }
    }

    async fn call_model(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        let model = self.model.model_name().to_string();
        let llm_span = info_span!(
            "llm_call",
            model = %model,
            messages = messages.len(),
            otel.name = "llm_call"
        );

        let call_start = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            result = self.model.complete(messages).instrument(llm_span) => result,
        };
        let elapsed = call_start.elapsed().as_secs_f64();
        LLM_CALL_DURATION.with_label_values(&[&model]).observe(elapsed);
        debug!(model = %model, duration_ms = elapsed * 1000.0, "LLM call completed");

        Ok(result?)
    }

    /// Execute one action and render the environment's response
    async fn execute(
        &self,
        action: &Action,
        staging: &mut EditStaging,
        env_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Executed, TaskError> {
        let kind = action.kind();
        println!("[AGENT] Action: {}", kind);

        let result = match check_semantics(action) {
            Ok(()) => self.dispatch(action, staging, env_id, cancel).await,
            Err(reason) => Err(ActionError::Invalid(reason)),
        };

        match result {
            Ok(Dispatched::Output(output)) => {
                ACTIONS_TOTAL.with_label_values(&[kind.name(), "ok"]).inc();
                Ok(Executed {
                    response: echo_output(&action.header().to_string(), &output),
                    completed: None,
                })
            }
            Ok(Dispatched::Completed {
                final_message,
                applied,
            }) => {
                ACTIONS_TOTAL.with_label_values(&[kind.name(), "ok"]).inc();
                Ok(Executed {
                    response: echo_output(&action.header().to_string(), &render_applied(&applied)),
                    completed: Some((final_message, applied)),
                })
            }
            Err(ActionError::Sandbox(SandboxError::Cancelled)) => Err(TaskError::Cancelled),
            Err(e) => {
                ACTIONS_TOTAL.with_label_values(&[kind.name(), "error"]).inc();
                warn!(action = %kind, error = %e, "Action failed");
                println!("[AGENT] ❌ {} failed: {}", kind, e);
                Ok(Executed {
                    response: json!({ "action": kind.name(), "error": e.to_string() }).to_string(),
                    completed: None,
                })
            }
        }
    }

    async fn dispatch(
        &self,
        action: &Action,
        staging: &mut EditStaging,
        env_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, ActionError> {
        let files = self.files.as_ref();
        match action {
            Action::ShowFileSummary { path } => {
                let content = self.read(path).await?;
                Ok(Dispatched::Output(summarize(path, &content).to_string()))
            }
            Action::ViewSection { path, start, end } => {
                let content = self.read(path).await?;
                Ok(Dispatched::Output(view_section(path, &content, *start, *end)))
            }
            Action::RunCommand { command } => {
                let sandbox = self.sandbox.as_ref().ok_or(ActionError::SandboxDisabled)?;
                let commands: Vec<String> = command.lines().map(str::to_string).collect();

                let notifier = Arc::clone(&self.notifier);
                let stream_id = env_id.to_string();
                let stream = OutputStream::new(env_id)
                    .observe(move |text| notifier.stream_partial(&stream_id, text));

                let output = sandbox.run_commands(&commands, Some(&stream), cancel).await?;
                Ok(Dispatched::Output(output))
            }
            Action::EditFile {
                path,
                start,
                end,
                content,
            } => {
                let preview = staging.preview_edit(files, path, *start, *end, content).await?;
                Ok(Dispatched::Output(preview.text))
            }
            Action::ValidateEdit => Ok(Dispatched::Output(staging.validate()?)),
            Action::ValidateAndApply => {
                let applied = staging.validate_and_apply(files).await?;
                Ok(Dispatched::Output(render_applied(&applied)))
            }
            Action::TaskCompleted { final_message } => {
                let applied = staging.commit(files).await?;
                Ok(Dispatched::Completed {
                    final_message: final_message.clone(),
                    applied,
                })
            }
        }
    }

    async fn read(&self, path: &str) -> Result<String, ActionError> {
        self.files.read(path).await.map_err(|source| ActionError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// Header followed by one fenced block holding `output`
///
/// The fence is one backtick longer than any run inside `output`, so
/// summaries and previews with their own fences stay inside the block.
fn echo_output(header: &str, output: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in output.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat((longest + 1).max(3));
    format!("{}\n{}\n{}\n{}", header, fence, output, fence)
}

fn render_applied(applied: &[FileSummary]) -> String {
    if applied.is_empty() {
        return "No edits were applied.".to_string();
    }
    let summaries: Vec<String> = applied.iter().map(ToString::to_string).collect();
    format!("Applied edits to {} file(s):\n\n{}", applied.len(), summaries.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::notify::TracingNotifier;
    use crate::llm::ScriptedModel;
    use crate::workspace::MemoryFiles;

    fn task_loop(model: ScriptedModel, files: Arc<MemoryFiles>, config: TaskConfig) -> TaskLoop {
        TaskLoop::new(Arc::new(model), files, Arc::new(TracingNotifier), config)
    }

    #[test]
    fn test_message_ids_extend() {
        let mut ids = MessageIds::new("100");
        assert_eq!(ids.root(), "100");
        assert_eq!(ids.next(), "100.1");
        assert_eq!(ids.next(), "100.1.2");
        assert_eq!(ids.next(), "100.1.2.3");
    }

    #[test]
    fn test_default_config() {
        let config = TaskConfig::default();
        assert_eq!(config.max_messages, 40);
        assert_eq!(config.parse_retries, 4);
        assert_eq!(config.preview_context, 4);
    }

    #[tokio::test]
    async fn test_view_section_response_echoes_header() {
        let files = Arc::new(MemoryFiles::new().with_file("a.py", "x = 1\ny = 2\n"));
        let model = ScriptedModel::new([
            r#"{"action": "viewSection", "path": "a.py", "start": 2, "end": 2}"#,
            r#"{"action": "taskCompleted", "finalMessage": "done"}"#,
        ]);
        let outcome = task_loop(model, files, TaskConfig::default())
            .run(TaskRequest::new("look"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.final_message(), Some("done"));
        let env = &outcome.messages[3];
        assert_eq!(env.role, Role::System);
        assert!(env.content.starts_with("{\"action\":\"viewSection\""));
        assert!(env.content.contains("2: y = 2"));
    }

    #[tokio::test]
    async fn test_odd_message_ceiling_is_rejected() {
        let config = TaskConfig {
            max_messages: 41,
            ..Default::default()
        };
        let result = task_loop(ScriptedModel::default(), Arc::new(MemoryFiles::new()), config)
            .run(TaskRequest::new("look"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(TaskError::Config(_))));
        assert!(TaskConfig { max_messages: 42, ..Default::default() }.check().is_ok());
        assert!(TaskConfig { max_messages: 0, ..Default::default() }.check().is_err());
    }

    #[test]
    fn test_echo_output_fence_outlasts_inner_fences() {
        assert_eq!(echo_output("{}", "plain"), "{}\n```\nplain\n```");

        let nested = "a.py (2 lines)\n```\n1: x = 1\n```";
        let echoed = echo_output("{}", nested);
        assert_eq!(echoed, format!("{{}}\n````\n{}\n````", nested));
    }

    #[tokio::test]
    async fn test_run_command_without_sandbox_is_reported() {
        let files = Arc::new(MemoryFiles::new());
        let model = ScriptedModel::new([
            r#"{"action": "runCommand", "command": "ls"}"#,
            r#"{"action": "taskCompleted", "finalMessage": "ok"}"#,
        ]);
        let outcome = task_loop(model, files, TaskConfig::default())
            .run(TaskRequest::new("list"), &CancellationToken::new())
            .await
            .unwrap();

        let error: serde_json::Value = serde_json::from_str(&outcome.messages[3].content).unwrap();
        assert_eq!(error["action"], "runCommand");
        assert_eq!(error["error"], "Running commands is disabled for this task");
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let files = Arc::new(MemoryFiles::new());
        let model = ScriptedModel::new(Vec::<String>::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = task_loop(model, files, TaskConfig::default())
            .run(TaskRequest::new("anything"), &cancel)
            .await;
        assert!(matches!(result, Err(TaskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_model_error_is_fatal() {
        let files = Arc::new(MemoryFiles::new());
        let model = ScriptedModel::new(Vec::<String>::new());
        let result = task_loop(model, files, TaskConfig::default())
            .run(TaskRequest::new("anything"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TaskError::Model(ChatError::Exhausted))));
    }
}
