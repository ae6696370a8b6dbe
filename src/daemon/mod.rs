// src/daemon/mod.rs

//! Daemon process lifecycle: start, stop, status for long-running tasks.
//!
//! A started daemon is isolated in its own OS process group so that stopping
//! it terminates the entire descendant tree, not just the immediate child.
//! The platform-specific pieces (group creation at spawn, whole-tree
//! signalling) live behind the [`ProcessController`] capability trait with
//! one implementation per platform, selected at compile time; tests can
//! inject their own controller.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Child;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::errors::{Result, TaskdeckError};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::UnixProcessController as PlatformController;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsProcessController as PlatformController;

/// Everything a controller needs to spawn one daemon process.
#[derive(Debug, Clone)]
pub struct DaemonSpawnSpec {
    pub task_name: String,
    pub session_id: String,
    /// Fully-substituted command line.
    pub command: String,
    pub shell: String,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Session log file; the daemon's stdout and stderr are appended here.
    pub log_path: PathBuf,
}

/// Platform capability consumed by [`DaemonManager`].
///
/// Implementations must spawn the child in a fresh process group and must
/// treat "target already gone" as a successful signal, not an error. An
/// implementation that cannot terminate the whole tree on its platform must
/// say so in the error it returns instead of silently killing only the
/// parent.
pub trait ProcessController: Send + Sync {
    /// Spawn the daemon process in a new process group, with stdout/stderr
    /// wired to the session log.
    fn spawn(&self, spec: &DaemonSpawnSpec) -> std::io::Result<Child>;

    /// Signal the whole process tree rooted at `pid`; `force` escalates
    /// from graceful termination to a hard kill where the platform makes
    /// the distinction.
    fn signal_tree(&self, pid: u32, force: bool) -> std::result::Result<(), String>;
}

/// Runtime state of one started daemon, keyed by task name.
struct DaemonState {
    pid: u32,
    session_id: String,
    log_path: PathBuf,
    started_at: DateTime<Utc>,
    /// Retained so the leader process can be reaped after a kill.
    child: Child,
}

/// Point-in-time view of a daemon task's state.
#[derive(Debug, Clone)]
pub struct DaemonSnapshot {
    pub running: bool,
    pub pid: Option<u32>,
    pub session_id: Option<String>,
    pub log_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
}

impl DaemonSnapshot {
    fn not_running() -> Self {
        Self {
            running: false,
            pid: None,
            session_id: None,
            log_path: None,
            started_at: None,
        }
    }
}

/// How long a stop waits for graceful exit before escalating to a hard
/// kill of the process group.
const STOP_GRACE: Duration = Duration::from_secs(2);
const STOP_POLL: Duration = Duration::from_millis(50);

/// Tracks and controls all running daemons.
///
/// The state table serializes concurrent start/stop/status calls; the lock
/// is never held across the stop grace period.
pub struct DaemonManager {
    controller: Box<dyn ProcessController>,
    states: Mutex<HashMap<String, DaemonState>>,
}

impl DaemonManager {
    pub fn new() -> Self {
        Self::with_controller(Box::new(PlatformController))
    }

    pub fn with_controller(controller: Box<dyn ProcessController>) -> Self {
        Self {
            controller,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Start a daemon for a task name.
    ///
    /// Rejecting a start while the task is already running is the caller's
    /// job; this is re-checked here only to keep the state table coherent
    /// under races.
    pub fn start(&self, spec: DaemonSpawnSpec) -> Result<u32> {
        let mut states = self.lock_states();

        if let Some(state) = states.get_mut(&spec.task_name) {
            match state.child.try_wait() {
                Ok(None) => {
                    return Err(TaskdeckError::Daemon(format!(
                        "daemon '{}' is already running (pid {})",
                        spec.task_name, state.pid
                    )));
                }
                Ok(Some(_)) | Err(_) => {
                    // Previous run exited on its own; clear the stale entry.
                    states.remove(&spec.task_name);
                }
            }
        }

        let child = self.controller.spawn(&spec).map_err(|err| {
            TaskdeckError::Daemon(format!(
                "failed to start daemon '{}': {err}",
                spec.task_name
            ))
        })?;
        let pid = child.id();

        info!(
            task = %spec.task_name,
            session = %spec.session_id,
            pid,
            "daemon started"
        );

        states.insert(
            spec.task_name.clone(),
            DaemonState {
                pid,
                session_id: spec.session_id,
                log_path: spec.log_path,
                started_at: Utc::now(),
                child,
            },
        );

        Ok(pid)
    }

    /// Stop a running daemon, terminating its whole process group.
    ///
    /// Blocks for up to the stop grace period; callers on an async runtime
    /// should wrap this in a blocking task.
    pub fn stop(&self, task_name: &str) -> Result<()> {
        let mut state = {
            let mut states = self.lock_states();
            states.remove(task_name).ok_or_else(|| {
                TaskdeckError::Daemon(format!("daemon '{task_name}' is not running"))
            })?
        };

        info!(task = %task_name, pid = state.pid, "stopping daemon");

        if let Err(err) = self.controller.signal_tree(state.pid, false) {
            // The daemon may still be alive; put the entry back so the
            // caller can retry.
            let message = format!("failed to stop daemon '{task_name}': {err}");
            self.lock_states().insert(task_name.to_string(), state);
            return Err(TaskdeckError::Daemon(message));
        }

        // Give the group a grace period to exit, then escalate.
        let mut exited = false;
        let deadline = std::time::Instant::now() + STOP_GRACE;
        while std::time::Instant::now() < deadline {
            match state.child.try_wait() {
                Ok(Some(_)) => {
                    exited = true;
                    break;
                }
                Ok(None) => std::thread::sleep(STOP_POLL),
                Err(err) => {
                    warn!(task = %task_name, error = %err, "try_wait failed during stop");
                    break;
                }
            }
        }

        if !exited {
            if let Err(err) = self.controller.signal_tree(state.pid, true) {
                return Err(TaskdeckError::Daemon(format!(
                    "failed to force-kill daemon '{task_name}': {err}"
                )));
            }
            if let Err(err) = state.child.wait() {
                warn!(task = %task_name, error = %err, "failed to reap daemon process");
            }
        }

        info!(task = %task_name, pid = state.pid, "daemon stopped");
        Ok(())
    }

    /// Current state of a daemon task.
    ///
    /// Never errors: a task that has never been started (or whose process
    /// has exited on its own) reports `running = false`.
    pub fn status(&self, task_name: &str) -> DaemonSnapshot {
        let mut states = self.lock_states();

        let Some(state) = states.get_mut(task_name) else {
            return DaemonSnapshot::not_running();
        };

        match state.child.try_wait() {
            Ok(None) => DaemonSnapshot {
                running: true,
                pid: Some(state.pid),
                session_id: Some(state.session_id.clone()),
                log_path: Some(state.log_path.clone()),
                started_at: Some(state.started_at),
            },
            Ok(Some(status)) => {
                info!(
                    task = %task_name,
                    pid = state.pid,
                    exit = ?status.code(),
                    "daemon exited on its own; clearing state"
                );
                states.remove(task_name);
                DaemonSnapshot::not_running()
            }
            Err(err) => {
                warn!(task = %task_name, error = %err, "daemon liveness probe failed");
                states.remove(task_name);
                DaemonSnapshot::not_running()
            }
        }
    }

    /// Session id of the current run, if the daemon is tracked.
    pub fn session_id(&self, task_name: &str) -> Option<String> {
        self.lock_states()
            .get(task_name)
            .map(|state| state.session_id.clone())
    }

    /// Stop every tracked daemon, aggregating failures instead of stopping
    /// at the first error. Used during graceful shutdown.
    pub fn stop_all(&self) -> Result<()> {
        let names: Vec<String> = self.lock_states().keys().cloned().collect();

        let mut failures = Vec::new();
        for name in names {
            if let Err(err) = self.stop(&name) {
                failures.push(err.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskdeckError::Daemon(format!(
                "failed to stop {} daemon(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<String, DaemonState>> {
        self.states.lock().expect("daemon state lock poisoned")
    }
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}
