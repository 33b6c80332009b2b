//! In-memory view of a store's discovered secret tree.
//!
//! A [`NamespaceMap`] maps leaf I/O paths to their payload, or to `None` while
//! the payload has not been fetched yet. Directory paths never appear as keys.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Path separator used by Vault logical paths
pub const SEPARATOR: char = '/';

/// One secret exactly as returned by a read of its leaf path.
pub type SecretPayload = Map<String, Value>;

/// Flat path → payload mapping covering one store's tree.
///
/// Backed by a `BTreeMap`, so iteration (and therefore partitioning and
/// snapshot line order) is deterministic for a given key set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceMap {
    entries: BTreeMap<String, Option<SecretPayload>>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leaf without fetching it.
    pub fn insert_placeholder(&mut self, path: impl Into<String>) {
        self.entries.insert(path.into(), None);
    }

    /// Record a leaf together with its payload.
    pub fn insert(&mut self, path: impl Into<String>, payload: SecretPayload) {
        self.entries.insert(path.into(), Some(payload));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// `None` if the path is unknown, `Some(None)` if known but unfetched.
    pub fn get(&self, path: &str) -> Option<Option<&SecretPayload>> {
        self.entries.get(path).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&SecretPayload>)> {
        self.entries.iter().map(|(path, payload)| (path.as_str(), payload.as_ref()))
    }

    /// Number of leaves whose payload has been fetched
    pub fn fetched(&self) -> usize {
        self.entries.values().filter(|payload| payload.is_some()).count()
    }
}

impl IntoIterator for NamespaceMap {
    type Item = (String, Option<SecretPayload>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Option<SecretPayload>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, SecretPayload)> for NamespaceMap {
    fn from_iter<I: IntoIterator<Item = (String, SecretPayload)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(path, payload)| (path, Some(payload))).collect() }
    }
}

/// Strip any trailing separators from a path.
pub fn trim_separator(path: &str) -> &str {
    path.trim_end_matches(SEPARATOR)
}

/// Whether a listing entry names a directory (`child/`).
pub fn is_directory(entry: &str) -> bool {
    entry.ends_with(SEPARATOR)
}

/// Join a parent path and a child entry with exactly one separator.
pub fn join(parent: &str, child: &str) -> String {
    let parent = trim_separator(parent);
    let child = trim_separator(child);
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}{}{}", parent, SEPARATOR, child)
    }
}

/// Build a payload from a JSON literal; panics if the value is not an object.
#[cfg(test)]
pub(crate) fn payload(value: Value) -> SecretPayload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {}", other),
    }
}
