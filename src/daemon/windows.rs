// src/daemon/windows.rs

//! Windows process controller: new-process-group spawn and recursive kill.
//!
//! Windows has no POSIX process groups to signal, so tree termination is a
//! forceful `taskkill /T /F` regardless of the requested escalation level.

use std::fs::{self, OpenOptions};
use std::os::windows::process::CommandExt;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use super::{DaemonSpawnSpec, ProcessController};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// `taskkill` exit code when the target process no longer exists.
const TASKKILL_NOT_FOUND: i32 = 128;

pub struct WindowsProcessController;

impl ProcessController for WindowsProcessController {
    fn spawn(&self, spec: &DaemonSpawnSpec) -> std::io::Result<Child> {
        if let Some(parent) = spec.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new("cmd");
        cmd.arg("/C")
            .arg(&spec.command)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .creation_flags(CREATE_NEW_PROCESS_GROUP);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn()
    }

    fn signal_tree(&self, pid: u32, _force: bool) -> Result<(), String> {
        debug!(pid, "terminating daemon process tree via taskkill");

        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .map_err(|err| format!("running taskkill for pid {pid}: {err}"))?;

        if output.status.success() {
            return Ok(());
        }
        if output.status.code() == Some(TASKKILL_NOT_FOUND) {
            // Target already gone; stopping something dead is a success.
            return Ok(());
        }

        Err(format!(
            "taskkill for pid {pid} failed with status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}
