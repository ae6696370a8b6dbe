// src/daemon/unix.rs

//! POSIX process controller: process-group spawn and whole-tree signalling.

use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use super::{DaemonSpawnSpec, ProcessController};

/// Spawns daemons with `setpgid(0, 0)` semantics and signals the negated
/// process id, which targets the whole group.
pub struct UnixProcessController;

impl ProcessController for UnixProcessController {
    fn spawn(&self, spec: &DaemonSpawnSpec) -> std::io::Result<Child> {
        if let Some(parent) = spec.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&spec.shell);
        cmd.arg("-c")
            .arg(&spec.command)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            // New process group with the child as leader, so its pgid equals
            // its pid and the entire descendant tree can be signalled at once.
            .process_group(0);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn()
    }

    fn signal_tree(&self, pid: u32, force: bool) -> Result<(), String> {
        let signal = if force { libc::SIGKILL } else { libc::SIGTERM };

        debug!(pid, signal, "signalling daemon process group");

        // Negative pid targets the whole process group created at spawn.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Group already gone; stopping something dead is a success.
            return Ok(());
        }
        Err(format!("signalling process group {pid} failed: {err}"))
    }
}
