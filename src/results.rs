// src/results.rs

//! Structured results produced by the engine.
//!
//! These are serialized at the protocol/CLI boundary; the snake_case field
//! names are part of the external contract. Results are created fresh per
//! execution and never mutated after being handed to a caller, which is what
//! makes sharing them across deduplicated waiters safe.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

fn duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn opt_duration_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Outcome of one one-shot task execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(serialize_with = "duration_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub task_name: String,
    pub log_path: String,
    pub timed_out: bool,
    pub session_id: String,
}

impl ExecutionResult {
    /// A result describing an operational failure that happened before the
    /// process produced any output (bad template, spawn failure).
    pub fn failure(
        task_name: impl Into<String>,
        session_id: impl Into<String>,
        log_path: impl Into<String>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            error: Some(error.into()),
            task_name: task_name.into(),
            log_path: log_path.into(),
            timed_out: false,
            session_id: session_id.into(),
        }
    }
}

/// One slot of a workflow run, in step order.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStepResult {
    pub step_index: usize,
    pub task_name: String,
    /// Absent when the step never ran (skipped) or failed structurally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    pub skipped: bool,
}

/// Outcome of a whole workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub workflow_name: String,
    pub steps: Vec<WorkflowStepResult>,
    #[serde(serialize_with = "duration_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_run: usize,
    pub steps_failed: usize,
}

/// Outcome of a daemon start request.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStartResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DaemonStartResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            pid: None,
            log_path: None,
            error: Some(error.into()),
            session_id: None,
        }
    }
}

/// Outcome of a daemon stop request.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStopResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only snapshot of a daemon task's lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "opt_duration_secs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DaemonStatus {
    pub fn not_running() -> Self {
        Self {
            running: false,
            pid: None,
            start_time: None,
            uptime: None,
            log_path: None,
            session_id: None,
        }
    }
}
