// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Kind of a task definition.
///
/// - `Oneshot`: runs to completion (or timeout) and returns a result.
/// - `Daemon`: runs indefinitely in the background with an explicit
///   start/stop/status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Oneshot,
    Daemon,
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Oneshot
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oneshot" => Ok(TaskKind::Oneshot),
            "daemon" => Ok(TaskKind::Daemon),
            other => Err(format!(
                "invalid task type: {other} (expected \"oneshot\" or \"daemon\")"
            )),
        }
    }
}
