// tests/workflow_execution.rs

mod common;
use crate::common::{engine_with, init_tracing, params};

use std::collections::BTreeMap;
use std::time::Duration;

use taskdeck::TaskdeckError;
use taskdeck_test_utils::builders::{
    ManifestBuilder, TaskConfigBuilder, WorkflowConfigBuilder,
};

fn ci_manifest() -> ManifestBuilder {
    ManifestBuilder::new()
        .with_task("lint", TaskConfigBuilder::new("echo lint-ok").build())
        .with_task("test", TaskConfigBuilder::new("exit 1").build())
        .with_task("build", TaskConfigBuilder::new("echo build-ok").build())
}

#[tokio::test]
async fn steps_execute_strictly_in_declared_order() {
    init_tracing();

    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("order.txt");

    let manifest = ManifestBuilder::new()
        .with_task(
            "first",
            TaskConfigBuilder::new(&format!("echo first >> {}", marker.display())).build(),
        )
        .with_task(
            "second",
            TaskConfigBuilder::new(&format!("echo second >> {}", marker.display())).build(),
        )
        .with_workflow(
            "ordered",
            WorkflowConfigBuilder::new().step("first").step("second").build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let result = engine
        .execute_workflow("ordered", &BTreeMap::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps_run, 2);
    assert_eq!(result.steps_failed, 0);

    let order = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(order, "first\nsecond\n");
}

#[tokio::test]
async fn failing_step_aborts_the_remaining_steps() {
    init_tracing();

    let manifest = ci_manifest()
        .with_workflow(
            "ci",
            WorkflowConfigBuilder::new()
                .step("lint")
                .step("test")
                .step("build")
                .build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let result = engine.execute_workflow("ci", &BTreeMap::new()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps_run, 2);
    assert_eq!(result.steps_failed, 1);
    assert_eq!(result.steps.len(), 3);
    assert!(!result.steps[0].skipped);
    assert!(!result.steps[1].skipped);
    assert!(result.steps[2].skipped);
    assert!(result.steps[2].result.is_none());

    let error = result.error.unwrap();
    assert!(error.contains("step 1"));
    assert!(error.contains("test"));
}

#[tokio::test]
async fn continue_on_failure_runs_remaining_steps_but_overall_failure_persists() {
    init_tracing();

    let manifest = ci_manifest()
        .with_workflow(
            "ci",
            WorkflowConfigBuilder::new()
                .step("lint")
                .step_with("test", &[], true)
                .step("build")
                .build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let result = engine.execute_workflow("ci", &BTreeMap::new()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps_run, 3);
    assert_eq!(result.steps_failed, 1);
    assert!(result.steps.iter().all(|s| !s.skipped));
    assert!(result.steps[2].result.as_ref().unwrap().success);
}

#[tokio::test]
async fn workflow_timeout_skips_steps_not_yet_started() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("slow", TaskConfigBuilder::new("sleep 2").build())
        .with_task("after", TaskConfigBuilder::new("echo after").build())
        .with_workflow(
            "deadline",
            WorkflowConfigBuilder::new()
                .timeout(1)
                .step("slow")
                .step("after")
                .build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let result = engine
        .execute_workflow("deadline", &BTreeMap::new())
        .await
        .unwrap();

    assert!(!result.success);

    // The running step is never interrupted; its own result is recorded.
    assert!(!result.steps[0].skipped);
    let first = result.steps[0].result.as_ref().unwrap();
    assert!(first.success);
    assert!(result.duration >= Duration::from_secs(2));

    // The next step never starts.
    assert!(result.steps[1].skipped);
    assert!(result.steps[1].result.is_none());
    assert_eq!(result.steps_run, 1);

    let error = result.error.unwrap();
    assert!(error.contains("timed out"));
    assert!(error.contains("step 1"));
    assert!(error.contains("after"));
}

#[tokio::test]
async fn step_params_resolve_from_workflow_parameters() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task(
            "greet",
            TaskConfigBuilder::new("echo {{.greeting}}")
                .param("greeting", true, None)
                .build(),
        )
        .with_workflow(
            "hello",
            WorkflowConfigBuilder::new()
                .param("name", Some("world"))
                .step_with("greet", &[("greeting", "hello {{.name}}")], false)
                .build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let defaulted = engine
        .execute_workflow("hello", &BTreeMap::new())
        .await
        .unwrap();
    assert!(defaulted.success);
    assert_eq!(
        defaulted.steps[0].result.as_ref().unwrap().stdout,
        "hello world\n"
    );

    let overridden = engine
        .execute_workflow("hello", &params(&[("name", "rust")]))
        .await
        .unwrap();
    assert_eq!(
        overridden.steps[0].result.as_ref().unwrap().stdout,
        "hello rust\n"
    );
}

#[tokio::test]
async fn unknown_workflow_is_a_returned_error() {
    init_tracing();

    let manifest = ci_manifest().build();
    let (engine, _dir) = engine_with(manifest);

    let err = engine
        .execute_workflow("missing", &BTreeMap::new())
        .await
        .unwrap_err();
    assert_eq!(err, TaskdeckError::WorkflowNotFound("missing".to_string()));
}
