#![allow(dead_code)]

pub use taskdeck_test_utils::init_tracing;

use std::collections::BTreeMap;

use taskdeck::{Engine, Manifest, SessionStore};
use tempfile::TempDir;

/// Build an engine over the given manifest with a scratch session directory.
///
/// The returned `TempDir` owns the session logs and must be kept alive for
/// the duration of the test.
pub fn engine_with(manifest: Manifest) -> (Engine, TempDir) {
    let dir = tempfile::tempdir().expect("create temp session dir");
    let engine = Engine::new(manifest, SessionStore::new(dir.path().join("sessions")))
        .expect("manifest validates");
    (engine, dir)
}

pub fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
