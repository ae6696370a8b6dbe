// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Returned errors are reserved for structural problems: unknown names,
//! invoking a daemon operation on a one-shot task, invalid manifests.
//! Runtime failures (bad template, spawn failure, non-zero exit, timeout)
//! are reported inside the result structs with `success = false`, so callers
//! always have a renderable result for anything operational.
//!
//! Every variant carries owned strings, which keeps the enum `Clone`; the
//! deduplicating runner hands one shared outcome to all concurrent waiters.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskdeckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Task '{0}' is a daemon task; use the daemon lifecycle operations")]
    NotOneshot(String),

    #[error("Task '{0}' is not a daemon task")]
    NotDaemon(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TaskdeckError {
    fn from(err: std::io::Error) -> Self {
        TaskdeckError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskdeckError>;
