// src/template.rs

//! `{{.param}}` placeholder substitution for command templates.
//!
//! Two modes:
//! - [`substitute`] is strict: every placeholder must resolve against the
//!   merged parameter map, otherwise the call fails naming the first
//!   missing parameter. Used for task commands.
//! - [`substitute_lenient`] replaces what it can and leaves unknown
//!   placeholders untouched. Used for workflow step parameters.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::config::model::ParameterSpec;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template references undefined parameter '{0}'")]
    UndefinedParameter(String),
}

/// Placeholder grammar: `{{.name}}` with optional interior whitespace.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}")
            .expect("placeholder regex is valid")
    })
}

/// Strict substitution: every placeholder must have a value in `params`.
pub fn substitute(
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut missing: Option<String> = None;

    let out = placeholder_re().replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => value.clone(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(TemplateError::UndefinedParameter(name)),
        None => Ok(out.into_owned()),
    }
}

/// Lenient substitution: unknown placeholders are left as-is.
pub fn substitute_lenient(template: &str, params: &BTreeMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Merge caller-supplied parameters over declared defaults.
///
/// Declared defaults seed the map (an explicit empty-string default counts);
/// caller values win on conflict.
pub fn merge_defaults(
    declared: &BTreeMap<String, ParameterSpec>,
    supplied: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();

    for (name, spec) in declared {
        if let Some(default) = &spec.default {
            merged.insert(name.clone(), default.clone());
        }
    }
    for (name, value) in supplied {
        merged.insert(name.clone(), value.clone());
    }

    merged
}
