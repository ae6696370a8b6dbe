// src/exec/dedup.rs

//! Concurrent-request deduplication for one-shot executions.
//!
//! Concurrent calls with the same (task, parameter set) key collapse into a
//! single underlying execution: the first caller runs the task, every other
//! caller blocks on the shared in-flight record and receives the identical
//! outcome once the run completes. The in-flight table lock is held only
//! across map reads and writes, never across the execution itself, so
//! unrelated keys are never blocked.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::errors::{Result, TaskdeckError};
use crate::results::ExecutionResult;

use super::runner::TaskRunner;

/// Shared outcome broadcast to all waiters of one in-flight execution.
type SharedOutcome = Result<ExecutionResult>;

/// Single-assignment cell: `None` until the executing caller publishes.
type OutcomeCell = Option<SharedOutcome>;

enum Role {
    /// First caller for the key; runs the task and publishes the outcome.
    Leader(watch::Sender<OutcomeCell>),
    /// Joined an existing in-flight execution; waits for the outcome.
    Follower(watch::Receiver<OutcomeCell>),
}

/// Wraps a [`TaskRunner`] with an at-most-one-concurrent-execution-per-key
/// guarantee.
pub struct DedupRunner {
    runner: Arc<TaskRunner>,
    inflight: Mutex<HashMap<String, watch::Receiver<OutcomeCell>>>,
}

impl DedupRunner {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self {
            runner,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Execute a one-shot task, coalescing with any identical in-flight
    /// request. Semantics are otherwise those of [`TaskRunner::execute`].
    pub async fn execute(
        &self,
        task_name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<ExecutionResult> {
        let key = dedup_key(task_name, params);

        let role = {
            let mut table = self.inflight.lock().await;
            match table.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    table.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                let outcome = self.runner.execute(task_name, params).await;

                // Publish before removing the record so a waiter that
                // grabbed a receiver just before removal still resolves.
                tx.send_replace(Some(outcome.clone()));
                self.inflight.lock().await.remove(&key);

                outcome
            }
            Role::Follower(mut rx) => {
                debug!(task = %task_name, key = %key, "joining in-flight execution");
                // Clone the published outcome out of the borrow guard before
                // the match so the non-`Send` `watch::Ref` never lives across
                // the `.await` in the abandoned-leader arm below; otherwise the
                // whole future would be non-`Send` and unspawnable.
                let waited = rx.wait_for(|cell| cell.is_some()).await.map(|cell| cell.clone());
                match waited {
                    Ok(cell) => cell.unwrap_or_else(|| {
                        Err(TaskdeckError::Execution(format!(
                            "in-flight record for task '{task_name}' resolved without an outcome"
                        )))
                    }),
                    Err(_) => {
                        // The leader was dropped before publishing (its
                        // caller went away mid-execution). Clear the stale
                        // record so the next caller can run fresh.
                        warn!(task = %task_name, key = %key, "in-flight execution abandoned");
                        self.inflight.lock().await.remove(&key);
                        Err(TaskdeckError::Execution(format!(
                            "in-flight execution of task '{task_name}' was abandoned"
                        )))
                    }
                }
            }
        }
    }
}

/// Deterministic key for a (task, parameter set) pair.
///
/// Parameters are JSON-encoded from a `BTreeMap`, so pairs are always
/// visited in key order and permutations of the same map hash identically;
/// an absent map and an empty map both encode as `{}`.
pub fn dedup_key(task_name: &str, params: &BTreeMap<String, String>) -> String {
    let encoded =
        serde_json::to_string(params).expect("string map serialization cannot fail");

    let mut hasher = blake3::Hasher::new();
    hasher.update(task_name.as_bytes());
    hasher.update(&[0]);
    hasher.update(encoded.as_bytes());
    hasher.finalize().to_hex().to_string()
}
