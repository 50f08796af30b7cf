//! Prometheus metrics for agent tasks
//!
//! Registered in the default registry; [`render`] produces the text
//! exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Task Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished tasks by outcome.
    ///
    /// Labels:
    /// - outcome: "completed", "message_ceiling", "parse_failure", "cancelled", "model_error"
    pub static ref TASKS_TOTAL: CounterVec = register_counter_vec!(
        "sandpiper_tasks_total",
        "Agent tasks finished, by outcome",
        &["outcome"]
    ).expect("failed to register TASKS_TOTAL metric");

    /// Dispatched actions.
    ///
    /// Labels:
    /// - action: wire name (e.g. "runCommand", "editFile")
    /// - status: "ok" or "error"
    pub static ref ACTIONS_TOTAL: CounterVec = register_counter_vec!(
        "sandpiper_actions_total",
        "Actions dispatched by the task loop",
        &["action", "status"]
    ).expect("failed to register ACTIONS_TOTAL metric");

    /// Model replies that could not be parsed into an action.
    pub static ref PARSE_FAILURES: Counter = register_counter!(
        "sandpiper_parse_failures_total",
        "Model replies rejected by the response parser"
    ).expect("failed to register PARSE_FAILURES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Collaborator Latency
    // ─────────────────────────────────────────────────────────────────────────────

    /// Wall-clock time of one completion call, retries included.
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "sandpiper_llm_call_duration_seconds",
        "Duration of model completion calls",
        &["model"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    /// Time from stuffing a command into the sandbox to seeing its end token.
    pub static ref SANDBOX_COMMAND_DURATION: Histogram = register_histogram!(
        "sandpiper_sandbox_command_duration_seconds",
        "Duration of sandboxed commands",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]
    ).expect("failed to register SANDBOX_COMMAND_DURATION metric");

    /// Staged edits written to disk.
    pub static ref EDITS_APPLIED: Counter = register_counter!(
        "sandpiper_edits_applied_total",
        "Validated edits written to disk"
    ).expect("failed to register EDITS_APPLIED metric");
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
