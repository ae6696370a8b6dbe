// tests/daemon_lifecycle.rs

#![cfg(unix)]

mod common;
use crate::common::{engine_with, init_tracing};

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use taskdeck::TaskdeckError;
use taskdeck_test_utils::builders::{ManifestBuilder, TaskConfigBuilder};

fn pid_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Poll until `pid` is gone or the deadline passes.
async fn wait_for_exit(pid: u32) -> bool {
    for _ in 0..40 {
        if !pid_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn start_status_stop_round_trip() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("sleeper", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let started = engine.start_daemon("sleeper", &BTreeMap::new()).await;
    assert!(started.success, "start failed: {:?}", started.error);
    let pid = started.pid.unwrap();
    assert!(pid > 0);
    assert!(started.session_id.is_some());
    assert!(started.log_path.is_some());

    let status = engine.daemon_status("sleeper").unwrap();
    assert!(status.running);
    assert_eq!(status.pid, Some(pid));
    assert!(status.start_time.is_some());
    assert!(status.uptime.is_some());
    assert_eq!(status.session_id, started.session_id);

    let stopped = engine.stop_daemon("sleeper").await;
    assert!(stopped.success, "stop failed: {:?}", stopped.error);
    assert!(wait_for_exit(pid).await);

    let status = engine.daemon_status("sleeper").unwrap();
    assert!(!status.running);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn double_start_is_rejected_and_the_original_pid_survives() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("dup", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let first = engine.start_daemon("dup", &BTreeMap::new()).await;
    assert!(first.success);
    let pid = first.pid.unwrap();

    let second = engine.start_daemon("dup", &BTreeMap::new()).await;
    assert!(!second.success);
    assert!(second.error.unwrap().contains("already running"));
    assert_eq!(second.pid, Some(pid));

    // The original process is untouched.
    assert!(pid_alive(pid));
    assert_eq!(engine.daemon_status("dup").unwrap().pid, Some(pid));

    let stopped = engine.stop_daemon("dup").await;
    assert!(stopped.success);
}

#[tokio::test]
async fn stop_when_not_running_is_a_failure_result() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("idle", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let stopped = engine.stop_daemon("idle").await;
    assert!(!stopped.success);
    assert!(stopped.message.contains("not running"));
}

#[tokio::test]
async fn status_of_never_started_daemon_reports_not_running() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("idle", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let status = engine.daemon_status("idle").unwrap();
    assert!(!status.running);
    assert!(status.pid.is_none());
    assert!(status.uptime.is_none());
}

#[tokio::test]
async fn daemon_status_of_unknown_task_is_a_returned_error() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("idle", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let err = engine.daemon_status("missing").unwrap_err();
    assert_eq!(err, TaskdeckError::TaskNotFound("missing".to_string()));
}

#[tokio::test]
async fn stopping_a_daemon_kills_its_whole_process_tree() {
    init_tracing();

    let scratch = tempfile::tempdir().unwrap();
    let pid_file = scratch.path().join("child.pid");

    // The shell spawns a child and waits on it; the child pid is recorded
    // so the test can probe it after the stop.
    let command = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

    let manifest = ManifestBuilder::new()
        .with_task("tree", TaskConfigBuilder::new(&command).daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let started = engine.start_daemon("tree", &BTreeMap::new()).await;
    assert!(started.success, "start failed: {:?}", started.error);

    // Wait for the child pid to land on disk.
    let mut child_pid: Option<u32> = None;
    for _ in 0..40 {
        if let Ok(contents) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = contents.trim().parse() {
                child_pid = Some(pid);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let child_pid = child_pid.expect("daemon recorded its child pid");
    assert!(pid_alive(child_pid));

    let stopped = engine.stop_daemon("tree").await;
    assert!(stopped.success, "stop failed: {:?}", stopped.error);

    // The grandchild dies with the group, not just the shell.
    assert!(
        wait_for_exit(child_pid).await,
        "descendant process survived the stop"
    );
}

#[tokio::test]
async fn daemon_output_lands_in_the_session_log() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task(
            "announcer",
            TaskConfigBuilder::new("echo daemon-hello; sleep 30").daemon().build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let started = engine.start_daemon("announcer", &BTreeMap::new()).await;
    assert!(started.success);
    let log_path = started.log_path.unwrap();

    let mut contents = String::new();
    for _ in 0..40 {
        contents = std::fs::read_to_string(&log_path).unwrap_or_default();
        if contents.contains("daemon-hello") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(contents.contains("daemon-hello"));

    let stopped = engine.stop_daemon("announcer").await;
    assert!(stopped.success);
}

#[tokio::test]
async fn daemon_command_substitutes_parameters() {
    init_tracing();

    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("daemon-param.txt");

    let manifest = ManifestBuilder::new()
        .with_task(
            "writer",
            TaskConfigBuilder::new(&format!("echo {{{{.value}}}} > {}; sleep 30", marker.display()))
                .daemon()
                .param("value", false, Some("from-default"))
                .build(),
        )
        .build();
    let (engine, _dir) = engine_with(manifest);

    let started = engine.start_daemon("writer", &BTreeMap::new()).await;
    assert!(started.success, "start failed: {:?}", started.error);

    let mut contents = String::new();
    for _ in 0..40 {
        contents = std::fs::read_to_string(&marker).unwrap_or_default();
        if !contents.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(contents.trim_end(), "from-default");

    let stopped = engine.stop_daemon("writer").await;
    assert!(stopped.success);
}

#[tokio::test]
async fn shutdown_stops_every_running_daemon() {
    init_tracing();

    let manifest = ManifestBuilder::new()
        .with_task("a", TaskConfigBuilder::new("sleep 30").daemon().build())
        .with_task("b", TaskConfigBuilder::new("sleep 30").daemon().build())
        .build();
    let (engine, _dir) = engine_with(manifest);

    let a = engine.start_daemon("a", &BTreeMap::new()).await;
    let b = engine.start_daemon("b", &BTreeMap::new()).await;
    assert!(a.success && b.success);

    engine.shutdown().await.unwrap();

    assert!(!engine.daemon_status("a").unwrap().running);
    assert!(!engine.daemon_status("b").unwrap().running);
    assert!(wait_for_exit(a.pid.unwrap()).await);
    assert!(wait_for_exit(b.pid.unwrap()).await);
}
