// src/exec/workflow.rs

//! Sequential workflow execution with partial-failure policy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::model::{Manifest, WorkflowStep};
use crate::errors::{Result, TaskdeckError};
use crate::results::{WorkflowResult, WorkflowStepResult};
use crate::template;

use super::runner::TaskRunner;

/// Runs workflows: ordered lists of one-shot task invocations sharing a
/// parameter set and a failure policy.
///
/// Steps execute strictly in declared order through the [`TaskRunner`]
/// directly — never through the deduplicating runner, so every step gets its
/// own session and log even when an identical one-shot call is in flight
/// elsewhere.
pub struct WorkflowRunner {
    manifest: Arc<Manifest>,
    runner: Arc<TaskRunner>,
}

impl WorkflowRunner {
    pub fn new(manifest: Arc<Manifest>, runner: Arc<TaskRunner>) -> Self {
        Self { manifest, runner }
    }

    /// Execute a workflow to completion, early abort, or timeout.
    ///
    /// A returned error means the workflow name is unknown; every step-level
    /// failure is recorded in the result.
    pub async fn execute(
        &self,
        workflow_name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<WorkflowResult> {
        let workflow = self
            .manifest
            .workflow(workflow_name)
            .ok_or_else(|| TaskdeckError::WorkflowNotFound(workflow_name.to_string()))?;

        let started = Instant::now();
        let merged = template::merge_defaults(&workflow.parameters, params);
        let deadline = (workflow.timeout > 0)
            .then(|| started + Duration::from_secs(workflow.timeout));

        info!(
            workflow = %workflow_name,
            steps = workflow.steps.len(),
            timeout_secs = workflow.timeout,
            "starting workflow"
        );

        let mut steps: Vec<WorkflowStepResult> = Vec::with_capacity(workflow.steps.len());
        let mut error: Option<String> = None;
        let mut success = true;

        for (index, step) in workflow.steps.iter().enumerate() {
            // The deadline only gates the *start* of a step; a step that is
            // already running is never interrupted by the workflow timeout.
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    workflow = %workflow_name,
                    step_index = index,
                    task = %step.task,
                    "workflow deadline expired; skipping remaining steps"
                );
                error = Some(format!(
                    "workflow timed out before step {index} ('{}')",
                    step.task
                ));
                success = false;
                skip_remaining(&mut steps, &workflow.steps, index);
                break;
            }

            let step_params = resolve_step_params(step, &merged);

            match self.runner.execute(&step.task, &step_params).await {
                Ok(result) => {
                    let failed = !result.success;
                    steps.push(WorkflowStepResult {
                        step_index: index,
                        task_name: step.task.clone(),
                        result: Some(result),
                        skipped: false,
                    });

                    if failed {
                        success = false;
                        if !step.continue_on_failure {
                            error = Some(format!(
                                "step {index} ('{}') failed",
                                step.task
                            ));
                            skip_remaining(&mut steps, &workflow.steps, index + 1);
                            break;
                        }
                        warn!(
                            workflow = %workflow_name,
                            step_index = index,
                            task = %step.task,
                            "step failed; continuing (continue_on_failure)"
                        );
                    }
                }
                Err(err) => {
                    success = false;
                    steps.push(WorkflowStepResult {
                        step_index: index,
                        task_name: step.task.clone(),
                        result: None,
                        skipped: false,
                    });

                    if !step.continue_on_failure {
                        error = Some(format!(
                            "step {index} ('{}') failed: {err}",
                            step.task
                        ));
                        skip_remaining(&mut steps, &workflow.steps, index + 1);
                        break;
                    }
                }
            }
        }

        let steps_run = steps.iter().filter(|s| !s.skipped).count();
        let steps_failed = steps
            .iter()
            .filter(|s| !s.skipped && s.result.as_ref().is_none_or(|r| !r.success))
            .count();
        let duration = started.elapsed();

        info!(
            workflow = %workflow_name,
            success,
            steps_run,
            steps_failed,
            "workflow finished"
        );

        Ok(WorkflowResult {
            success,
            workflow_name: workflow_name.to_string(),
            steps,
            duration,
            error,
            steps_run,
            steps_failed,
        })
    }
}

/// Resolve a step's parameter templates against the merged workflow
/// parameters. Lenient: unknown placeholders pass through unchanged.
fn resolve_step_params(
    step: &WorkflowStep,
    workflow_params: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    step.params
        .iter()
        .map(|(name, tpl)| {
            (
                name.clone(),
                template::substitute_lenient(tpl, workflow_params),
            )
        })
        .collect()
}

/// Record `skipped = true` slots for every step from `from` onwards.
fn skip_remaining(
    results: &mut Vec<WorkflowStepResult>,
    steps: &[WorkflowStep],
    from: usize,
) {
    for (index, step) in steps.iter().enumerate().skip(from) {
        results.push(WorkflowStepResult {
            step_index: index,
            task_name: step.task.clone(),
            result: None,
            skipped: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ParameterSpec;

    fn step_with_params(task: &str, pairs: &[(&str, &str)]) -> WorkflowStep {
        WorkflowStep {
            task: task.to_string(),
            params: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            continue_on_failure: false,
        }
    }

    #[test]
    fn step_params_resolve_from_workflow_params() {
        let step = step_with_params("deploy", &[("target", "{{.env}}"), ("fixed", "prod-eu")]);
        let mut wf_params = BTreeMap::new();
        wf_params.insert("env".to_string(), "staging".to_string());

        let resolved = resolve_step_params(&step, &wf_params);
        assert_eq!(resolved.get("target").map(String::as_str), Some("staging"));
        assert_eq!(resolved.get("fixed").map(String::as_str), Some("prod-eu"));
    }

    #[test]
    fn unknown_placeholder_passes_through() {
        let step = step_with_params("deploy", &[("target", "{{.missing}}")]);
        let resolved = resolve_step_params(&step, &BTreeMap::new());
        assert_eq!(
            resolved.get("target").map(String::as_str),
            Some("{{.missing}}")
        );
    }

    #[test]
    fn merge_defaults_applies_to_workflow_parameters() {
        let mut declared = BTreeMap::new();
        declared.insert(
            "env".to_string(),
            ParameterSpec {
                param_type: "string".to_string(),
                required: false,
                description: String::new(),
                default: Some("dev".to_string()),
            },
        );

        let merged = template::merge_defaults(&declared, &BTreeMap::new());
        assert_eq!(merged.get("env").map(String::as_str), Some("dev"));
    }
}
