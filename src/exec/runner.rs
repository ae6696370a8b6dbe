// src/exec/runner.rs

//! Single-execution task runner.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::model::{Manifest, TaskConfig, WORKING_DIRECTORY_PARAM};
use crate::errors::{Result, TaskdeckError};
use crate::results::ExecutionResult;
use crate::session::SessionStore;
use crate::template;
use crate::types::TaskKind;

/// Executes one one-shot task to completion or timeout.
///
/// A returned error means a structural problem (unknown task, daemon task);
/// every runtime failure is reported inside the result with
/// `success = false`.
pub struct TaskRunner {
    manifest: Arc<Manifest>,
    sessions: Arc<SessionStore>,
}

impl TaskRunner {
    pub fn new(manifest: Arc<Manifest>, sessions: Arc<SessionStore>) -> Self {
        Self { manifest, sessions }
    }

    pub async fn execute(
        &self,
        task_name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ExecutionResult> {
        let task = self
            .manifest
            .task(task_name)
            .ok_or_else(|| TaskdeckError::TaskNotFound(task_name.to_string()))?;
        if task.kind == TaskKind::Daemon {
            return Err(TaskdeckError::NotOneshot(task_name.to_string()));
        }

        let session_id = self.sessions.generate_session_id();
        let log_path = self
            .sessions
            .session_log_path(&session_id)
            .display()
            .to_string();
        let started = Instant::now();

        let merged = template::merge_defaults(&task.parameters, params);

        let command = match template::substitute(&task.command, &merged) {
            Ok(command) => command,
            Err(err) => {
                let result = ExecutionResult::failure(
                    task_name,
                    &session_id,
                    &log_path,
                    started.elapsed(),
                    format!("parameter substitution failed: {err}"),
                );
                self.write_session_log(&result);
                return Ok(result);
            }
        };

        info!(
            task = %task_name,
            session = %session_id,
            cmd = %command,
            "starting task process"
        );

        let mut cmd = Command::new(&task.shell);
        cmd.arg("-c")
            .arg(&command)
            .envs(&task.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = resolve_working_dir(task, &merged) {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let result = ExecutionResult::failure(
                    task_name,
                    &session_id,
                    &log_path,
                    started.elapsed(),
                    format!("failed to spawn '{}': {err}", task.shell),
                );
                self.write_session_log(&result);
                return Ok(result);
            }
        };

        let stdout_reader = spawn_pipe_reader(child.stdout.take());
        let stderr_reader = spawn_pipe_reader(child.stderr.take());

        // Either the process exits on its own, or the declared deadline
        // expires first. On expiry the process is killed and reaped before
        // the output buffers are joined, so the readers observe EOF.
        let mut timed_out = false;
        let mut wait_error: Option<String> = None;
        let mut exit_code = -1;
        let mut exited_success = false;

        let status = if task.timeout > 0 {
            match tokio::time::timeout(Duration::from_secs(task.timeout), child.wait()).await {
                Ok(status) => Some(status),
                Err(_) => {
                    timed_out = true;
                    info!(
                        task = %task_name,
                        session = %session_id,
                        timeout_secs = task.timeout,
                        "task deadline expired; killing process"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(
                            task = %task_name,
                            session = %session_id,
                            error = %err,
                            "failed to kill timed-out process"
                        );
                    }
                    None
                }
            }
        } else {
            Some(child.wait().await)
        };

        match status {
            Some(Ok(status)) => {
                exit_code = status.code().unwrap_or(-1);
                exited_success = status.success();
            }
            Some(Err(err)) => {
                wait_error = Some(format!("waiting for process: {err}"));
            }
            None => {}
        }

        let stdout = join_pipe_reader(stdout_reader).await;
        let stderr = join_pipe_reader(stderr_reader).await;
        let duration = started.elapsed();

        let success = exited_success && !timed_out && wait_error.is_none();
        let error = if timed_out {
            Some(format!("task timed out after {}s", task.timeout))
        } else if let Some(err) = wait_error {
            Some(err)
        } else if !success {
            Some(format!("command exited with code {exit_code}"))
        } else {
            None
        };

        info!(
            task = %task_name,
            session = %session_id,
            exit_code,
            success,
            timed_out,
            "task process finished"
        );

        let result = ExecutionResult {
            success,
            exit_code,
            stdout,
            stderr,
            duration,
            error,
            task_name: task_name.to_string(),
            log_path,
            timed_out,
            session_id,
        };
        self.write_session_log(&result);
        Ok(result)
    }

    /// Best-effort: a log write failure is reported but never fails the
    /// execution itself.
    fn write_session_log(&self, result: &ExecutionResult) {
        let write = || -> anyhow::Result<()> {
            let mut log = self.sessions.open_log(&result.session_id)?;
            log.write(result.stdout.as_bytes())?;
            log.write(result.stderr.as_bytes())?;
            log.update_metadata(BTreeMap::from([
                ("task".to_string(), result.task_name.clone()),
                ("exit_code".to_string(), result.exit_code.to_string()),
                ("timed_out".to_string(), result.timed_out.to_string()),
                (
                    "duration_secs".to_string(),
                    format!("{:.3}", result.duration.as_secs_f64()),
                ),
            ]));
            log.close()?;
            Ok(())
        };

        if let Err(err) = write() {
            warn!(
                session = %result.session_id,
                error = %err,
                "failed to write session log"
            );
        }
    }
}

/// Resolve the effective working directory for a task invocation.
///
/// A non-empty `working_directory` parameter wins when the task exposes it;
/// an empty-string parameter value means "not provided" and falls back to
/// the static declared directory.
pub(crate) fn resolve_working_dir(
    task: &TaskConfig,
    params: &BTreeMap<String, String>,
) -> Option<PathBuf> {
    if task.expose_working_directory {
        if let Some(dir) = params.get(WORKING_DIRECTORY_PARAM) {
            if !dir.is_empty() {
                return Some(PathBuf::from(dir));
            }
        }
    }
    task.working_directory
        .as_deref()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn join_pipe_reader(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.await.unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
