// src/config/validate.rs

//! Manifest cross-checks performed before the engine accepts a manifest.

use crate::config::model::Manifest;
use crate::errors::{Result, TaskdeckError};
use crate::types::TaskKind;

/// Validate cross-references inside a manifest.
///
/// - every workflow step must name an existing task of one-shot kind
///   (daemon tasks cannot be workflow steps);
/// - every declared `depends_on` name must exist.
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    for (task_name, task) in &manifest.tasks {
        for dep in &task.depends_on {
            if !manifest.tasks.contains_key(dep) {
                return Err(TaskdeckError::Config(format!(
                    "task '{task_name}' depends on unknown task '{dep}'"
                )));
            }
        }
    }

    for (wf_name, wf) in &manifest.workflows {
        for (index, step) in wf.steps.iter().enumerate() {
            match manifest.tasks.get(&step.task) {
                None => {
                    return Err(TaskdeckError::Config(format!(
                        "workflow '{wf_name}' step {index} references unknown task '{}'",
                        step.task
                    )));
                }
                Some(task) if task.kind == TaskKind::Daemon => {
                    return Err(TaskdeckError::Config(format!(
                        "workflow '{wf_name}' step {index} references daemon task '{}'; \
                         steps must be one-shot tasks",
                        step.task
                    )));
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}
