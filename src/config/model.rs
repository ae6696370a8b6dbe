// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::TaskKind;

/// Shell used when a task does not declare one.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Name of the parameter that overrides a task's working directory when
/// `expose_working_directory` is set.
pub const WORKING_DIRECTORY_PARAM: &str = "working_directory";

/// A single declared parameter of a task or workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    /// Declared value type (informational; everything is substituted as a
    /// string).
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,

    /// Whether a value must be available (supplied or defaulted) at run time.
    #[serde(default)]
    pub required: bool,

    /// Human-readable description for front ends.
    #[serde(default)]
    pub description: String,

    /// Optional default value.
    ///
    /// An explicit empty-string default is a real default and substitutes
    /// verbatim into the command.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// A single task definition.
///
/// Keys in [`Manifest::tasks`] are the task names.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Command template; `{{.name}}` placeholders reference parameters.
    pub command: String,

    /// `oneshot` (default) or `daemon`.
    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    /// Timeout in seconds; 0 means unbounded. Ignored for daemon tasks.
    #[serde(default)]
    pub timeout: u64,

    /// Shell the command runs under (`<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Static working directory for the command.
    #[serde(default)]
    pub working_directory: Option<String>,

    /// If true, a non-empty `working_directory` parameter supplied by the
    /// caller overrides the static working directory.
    #[serde(default)]
    pub expose_working_directory: bool,

    /// Environment overlay applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Declared parameters by name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,

    /// Declarative dependency names. Recorded for front ends; the engine
    /// never enforces them.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

/// One step of a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStep {
    /// Name of the one-shot task to run.
    pub task: String,

    /// Step parameter templates; values may reference workflow parameters
    /// with `{{.name}}` placeholders.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// If true, a failure of this step does not abort the remaining steps.
    #[serde(default)]
    pub continue_on_failure: bool,
}

/// A workflow definition: an ordered sequence of one-shot task invocations.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Timeout in seconds for the whole run; 0 means unbounded.
    #[serde(default)]
    pub timeout: u64,

    /// Declared workflow parameters by name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,

    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

/// All task and workflow definitions known to the engine.
///
/// Immutable once constructed; shared as `Arc<Manifest>` across runners.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// All tasks, keyed by task name.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,

    /// All workflows, keyed by workflow name.
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowConfig>,
}

impl Manifest {
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.get(name)
    }

    pub fn workflow(&self, name: &str) -> Option<&WorkflowConfig> {
        self.workflows.get(name)
    }
}
