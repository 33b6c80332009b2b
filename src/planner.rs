//! # Diff Planner
//!
//! Decides which source keys have to be written to the destination.
//!
//! Under the presence policy a key is copied when the destination does not
//! have it; only destination paths are needed. Under the value policy a key
//! present on both sides is also copied when the payloads differ, which needs
//! both sides fetched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::namespace::{NamespaceMap, SecretPayload};
use crate::store::Dialect;

/// How a key present on both sides is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiffPolicy {
    /// Copy only keys missing from the destination
    #[default]
    Presence,
    /// Also copy keys whose payloads differ
    Value,
}

impl DiffPolicy {
    /// Whether destination payloads must be fetched before planning
    pub fn needs_destination_values(self) -> bool {
        matches!(self, DiffPolicy::Value)
    }
}

impl fmt::Display for DiffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffPolicy::Presence => f.write_str("presence"),
            DiffPolicy::Value => f.write_str("value"),
        }
    }
}

impl FromStr for DiffPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "presence" => Ok(DiffPolicy::Presence),
            "value" => Ok(DiffPolicy::Value),
            other => Err(Error::config(format!(
                "Unsupported diff policy '{}'. Use 'presence' or 'value'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub policy: DiffPolicy,
    /// Record destination-only keys as deletion candidates
    pub mirror: bool,
}

/// One key to copy, with its payload when the source side already has it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub path: String,
    pub payload: Option<SecretPayload>,
}

impl WorkItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), payload: None }
    }
}

/// Result of diffing a source map against a destination map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyPlan {
    /// Keys to write, in source map order
    pub work: Vec<WorkItem>,
    /// Source keys the destination already satisfies
    pub unchanged: Vec<String>,
    /// Destination-only keys; reported under mirror, never deleted
    pub delete_candidates: Vec<String>,
}

impl CopyPlan {
    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }
}

/// Compute the copy plan for `source` against `destination`.
pub fn plan(
    source: &NamespaceMap,
    destination: &NamespaceMap,
    dialect: Dialect,
    options: PlanOptions,
) -> CopyPlan {
    let mut result = CopyPlan::default();

    for (path, payload) in source.iter() {
        let selected = match destination.get(path) {
            None => true,
            Some(existing) => match options.policy {
                DiffPolicy::Presence => false,
                DiffPolicy::Value => differs(dialect, payload, existing),
            },
        };

        if selected {
            result.work.push(WorkItem { path: path.to_string(), payload: payload.cloned() });
        } else {
            result.unchanged.push(path.to_string());
        }
    }

    if options.mirror {
        result.delete_candidates =
            destination.paths().filter(|path| !source.contains(path)).map(str::to_string).collect();
        if !result.delete_candidates.is_empty() {
            info!(
                candidates = result.delete_candidates.len(),
                "Destination-only keys found; deletion is not performed"
            );
        }
    }

    debug!(
        policy = %options.policy,
        work = result.work.len(),
        unchanged = result.unchanged.len(),
        "Plan computed"
    );
    result
}

/// Value comparison; an unfetched side cannot be proven equal.
fn differs(dialect: Dialect, source: Option<&SecretPayload>, dest: Option<&SecretPayload>) -> bool {
    match (source, dest) {
        (Some(source), Some(dest)) => dialect.secret_data(source) != dialect.secret_data(dest),
        _ => true,
    }
}
