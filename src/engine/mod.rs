// src/engine/mod.rs

//! Orchestration facade: the single entry point used by front ends.
//!
//! Binds the runners and the daemon manager together:
//! - one-shot executions go through the deduplicating runner;
//! - workflow executions go through the workflow runner (whose steps bypass
//!   deduplication);
//! - daemon operations validate the task's kind and current lifecycle state
//!   before delegating to the daemon manager.
//!
//! Returned errors are reserved for structural mistakes (unknown names,
//! wrong task kind on a read-only query); lifecycle conflicts such as
//! "already running" come back as `success = false` results.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::model::Manifest;
use crate::config::validate::validate_manifest;
use crate::daemon::{DaemonManager, DaemonSpawnSpec};
use crate::errors::{Result, TaskdeckError};
use crate::exec::runner::{resolve_working_dir, TaskRunner};
use crate::exec::{DedupRunner, WorkflowRunner};
use crate::results::{
    DaemonStartResult, DaemonStatus, DaemonStopResult, ExecutionResult, WorkflowResult,
};
use crate::session::SessionStore;
use crate::template;
use crate::types::TaskKind;

pub struct Engine {
    manifest: Arc<Manifest>,
    sessions: Arc<SessionStore>,
    dedup: DedupRunner,
    workflows: WorkflowRunner,
    daemons: Arc<DaemonManager>,
}

impl Engine {
    /// Build an engine over a validated manifest.
    pub fn new(manifest: Manifest, sessions: SessionStore) -> Result<Self> {
        Self::with_daemon_manager(manifest, sessions, DaemonManager::new())
    }

    /// Like [`Engine::new`] but with an injected daemon manager (used by
    /// tests to substitute the process controller).
    pub fn with_daemon_manager(
        manifest: Manifest,
        sessions: SessionStore,
        daemons: DaemonManager,
    ) -> Result<Self> {
        validate_manifest(&manifest)?;

        let manifest = Arc::new(manifest);
        let sessions = Arc::new(sessions);
        let runner = Arc::new(TaskRunner::new(
            Arc::clone(&manifest),
            Arc::clone(&sessions),
        ));

        Ok(Self {
            dedup: DedupRunner::new(Arc::clone(&runner)),
            workflows: WorkflowRunner::new(Arc::clone(&manifest), runner),
            daemons: Arc::new(daemons),
            manifest,
            sessions,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Execute a one-shot task; concurrent identical requests share one
    /// underlying execution.
    pub async fn execute_oneshot(
        &self,
        task_name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ExecutionResult> {
        self.dedup.execute(task_name, params).await
    }

    /// Execute a workflow to completion, early abort, or timeout.
    pub async fn execute_workflow(
        &self,
        workflow_name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<WorkflowResult> {
        self.workflows.execute(workflow_name, params).await
    }

    /// Start a daemon task in the background.
    ///
    /// Lifecycle conflicts (unknown task, wrong kind, already running) are
    /// reported inside the result; the existing process is never touched.
    pub async fn start_daemon(
        &self,
        task_name: &str,
        params: &BTreeMap<String, String>,
    ) -> DaemonStartResult {
        let Some(task) = self.manifest.task(task_name) else {
            return DaemonStartResult::failure(format!("task not found: {task_name}"));
        };
        if task.kind != TaskKind::Daemon {
            return DaemonStartResult::failure(format!(
                "task '{task_name}' is not a daemon task"
            ));
        }

        let current = self.daemons.status(task_name);
        if current.running {
            return DaemonStartResult {
                success: false,
                pid: current.pid,
                log_path: current.log_path.map(|p| p.display().to_string()),
                error: Some(format!("daemon '{task_name}' is already running")),
                session_id: current.session_id,
            };
        }

        let merged = template::merge_defaults(&task.parameters, params);
        let command = match template::substitute(&task.command, &merged) {
            Ok(command) => command,
            Err(err) => {
                return DaemonStartResult::failure(format!(
                    "parameter substitution failed: {err}"
                ));
            }
        };

        let session_id = self.sessions.generate_session_id();
        let log_path = self.sessions.session_log_path(&session_id);

        let spawn = self.daemons.start(DaemonSpawnSpec {
            task_name: task_name.to_string(),
            session_id: session_id.clone(),
            command,
            shell: task.shell.clone(),
            env: task.env.clone(),
            working_dir: resolve_working_dir(task, &merged),
            log_path: log_path.clone(),
        });
        if let Err(err) = spawn {
            return DaemonStartResult::failure(err.to_string());
        }

        // Re-query so the reported pid reflects the tracked state.
        let status = self.daemons.status(task_name);
        DaemonStartResult {
            success: true,
            pid: status.pid,
            log_path: Some(log_path.display().to_string()),
            error: None,
            session_id: Some(session_id),
        }
    }

    /// Stop a running daemon, terminating its whole process tree.
    pub async fn stop_daemon(&self, task_name: &str) -> DaemonStopResult {
        let Some(task) = self.manifest.task(task_name) else {
            return DaemonStopResult {
                success: false,
                message: format!("task not found: {task_name}"),
                error: None,
            };
        };
        if task.kind != TaskKind::Daemon {
            return DaemonStopResult {
                success: false,
                message: format!("task '{task_name}' is not a daemon task"),
                error: None,
            };
        }
        if !self.daemons.status(task_name).running {
            return DaemonStopResult {
                success: false,
                message: format!("daemon '{task_name}' is not running"),
                error: None,
            };
        }

        // The stop blocks for up to the grace period while the process
        // group winds down; keep it off the async workers.
        let daemons = Arc::clone(&self.daemons);
        let name = task_name.to_string();
        let stopped = tokio::task::spawn_blocking(move || daemons.stop(&name)).await;

        match stopped {
            Ok(Ok(())) => DaemonStopResult {
                success: true,
                message: format!("daemon '{task_name}' stopped"),
                error: None,
            },
            Ok(Err(err)) => DaemonStopResult {
                success: false,
                message: format!("failed to stop daemon '{task_name}'"),
                error: Some(err.to_string()),
            },
            Err(err) => DaemonStopResult {
                success: false,
                message: format!("failed to stop daemon '{task_name}'"),
                error: Some(format!("stop task panicked: {err}")),
            },
        }
    }

    /// Read-only lifecycle snapshot of a daemon task.
    ///
    /// Unlike start/stop, a wrong name or kind here is a returned error:
    /// there is no natural failure-result shape for a pure query.
    pub fn daemon_status(&self, task_name: &str) -> Result<DaemonStatus> {
        let task = self
            .manifest
            .task(task_name)
            .ok_or_else(|| TaskdeckError::TaskNotFound(task_name.to_string()))?;
        if task.kind != TaskKind::Daemon {
            return Err(TaskdeckError::NotDaemon(task_name.to_string()));
        }

        let snapshot = self.daemons.status(task_name);
        if !snapshot.running {
            return Ok(DaemonStatus::not_running());
        }

        let uptime = snapshot
            .started_at
            .map(|t| (Utc::now() - t).to_std().unwrap_or_default());

        Ok(DaemonStatus {
            running: true,
            pid: snapshot.pid,
            start_time: snapshot.started_at,
            uptime,
            log_path: snapshot.log_path.map(|p| p.display().to_string()),
            session_id: snapshot.session_id,
        })
    }

    /// Stop every running daemon; used during graceful shutdown of the
    /// hosting process.
    pub async fn shutdown(&self) -> Result<()> {
        info!("engine shutdown: stopping all daemons");

        let daemons = Arc::clone(&self.daemons);
        match tokio::task::spawn_blocking(move || daemons.stop_all()).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "shutdown stop task panicked");
                Err(TaskdeckError::Daemon(format!(
                    "shutdown stop task panicked: {err}"
                )))
            }
        }
    }
}
