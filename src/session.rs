// src/session.rs

//! Execution sessions: id minting, per-session log files and metadata.
//!
//! Every execution (one-shot run, workflow step, daemon start) is issued a
//! fresh session id that correlates the run with its log file. Log retention
//! and retrieval are handled by the embedding front end; the engine only
//! writes.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

/// Mints session ids and resolves their log paths under a base directory.
#[derive(Debug)]
pub struct SessionStore {
    base_dir: PathBuf,
    counter: AtomicU64,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Mint a fresh session id: `<UTC timestamp>-<sequence>`.
    ///
    /// The process-wide sequence keeps ids unique even when several
    /// executions start within the same second; the timestamp prefix keeps
    /// them sortable.
    pub fn generate_session_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", Utc::now().format("%Y%m%d-%H%M%S"), seq)
    }

    /// Log file path for a session id.
    pub fn session_log_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.log"))
    }

    /// Open the log writer for a session, creating the base directory on
    /// first use.
    pub fn open_log(&self, session_id: &str) -> Result<SessionLog> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("creating session log directory at {:?}", self.base_dir)
        })?;

        let path = self.session_log_path(session_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening session log at {path:?}"))?;

        debug!(session = %session_id, path = %path.display(), "opened session log");

        Ok(SessionLog {
            session_id: session_id.to_string(),
            path,
            writer: BufWriter::new(file),
            metadata: BTreeMap::new(),
        })
    }
}

/// Per-execution log writer.
///
/// Exclusively owned by the execution that created it; never shared.
/// Metadata accumulates in memory and is flushed to a `<id>.meta.json`
/// sidecar on [`SessionLog::close`].
pub struct SessionLog {
    session_id: String,
    path: PathBuf,
    writer: BufWriter<File>,
    metadata: BTreeMap<String, String>,
}

impl SessionLog {
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .with_context(|| format!("writing to session log {:?}", self.path))?;
        Ok(())
    }

    /// Merge entries into the session metadata.
    pub fn update_metadata(&mut self, entries: BTreeMap<String, String>) {
        self.metadata.extend(entries);
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Flush the log and persist the metadata sidecar.
    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing session log {:?}", self.path))?;

        if !self.metadata.is_empty() {
            let sidecar = self.path.with_extension("meta.json");
            let json = serde_json::to_string_pretty(&self.metadata)
                .context("serializing session metadata")?;
            fs::write(&sidecar, json)
                .with_context(|| format!("writing session metadata to {sidecar:?}"))?;
        }

        Ok(())
    }
}
