#![allow(dead_code)]

use std::collections::BTreeMap;

use taskdeck::config::{
    Manifest, ParameterSpec, TaskConfig, WorkflowConfig, WorkflowStep, DEFAULT_SHELL,
};
use taskdeck::TaskKind;

/// Builder for `Manifest` to simplify test setup.
pub struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            manifest: Manifest::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.manifest.tasks.insert(name.to_string(), task);
        self
    }

    pub fn with_workflow(mut self, name: &str, workflow: WorkflowConfig) -> Self {
        self.manifest.workflows.insert(name.to_string(), workflow);
        self
    }

    pub fn build(self) -> Manifest {
        self.manifest
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            task: TaskConfig {
                command: command.to_string(),
                kind: TaskKind::Oneshot,
                timeout: 0,
                shell: DEFAULT_SHELL.to_string(),
                working_directory: None,
                expose_working_directory: false,
                env: BTreeMap::new(),
                parameters: BTreeMap::new(),
                depends_on: vec![],
            },
        }
    }

    pub fn daemon(mut self) -> Self {
        self.task.kind = TaskKind::Daemon;
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.task.timeout = seconds;
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.task.shell = shell.to_string();
        self
    }

    pub fn working_directory(mut self, dir: &str) -> Self {
        self.task.working_directory = Some(dir.to_string());
        self
    }

    pub fn expose_working_directory(mut self, val: bool) -> Self {
        self.task.expose_working_directory = val;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn param(mut self, name: &str, required: bool, default: Option<&str>) -> Self {
        self.task.parameters.insert(
            name.to_string(),
            ParameterSpec {
                param_type: "string".to_string(),
                required,
                description: String::new(),
                default: default.map(|s| s.to_string()),
            },
        );
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `WorkflowConfig`.
pub struct WorkflowConfigBuilder {
    workflow: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn new() -> Self {
        Self {
            workflow: WorkflowConfig {
                timeout: 0,
                parameters: BTreeMap::new(),
                steps: vec![],
            },
        }
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.workflow.timeout = seconds;
        self
    }

    pub fn param(mut self, name: &str, default: Option<&str>) -> Self {
        self.workflow.parameters.insert(
            name.to_string(),
            ParameterSpec {
                param_type: "string".to_string(),
                required: false,
                description: String::new(),
                default: default.map(|s| s.to_string()),
            },
        );
        self
    }

    pub fn step(mut self, task: &str) -> Self {
        self.workflow.steps.push(WorkflowStep {
            task: task.to_string(),
            params: BTreeMap::new(),
            continue_on_failure: false,
        });
        self
    }

    pub fn step_with(mut self, task: &str, params: &[(&str, &str)], continue_on_failure: bool) -> Self {
        self.workflow.steps.push(WorkflowStep {
            task: task.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            continue_on_failure,
        });
        self
    }

    pub fn build(self) -> WorkflowConfig {
        self.workflow
    }
}

impl Default for WorkflowConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
