//! Recursive discovery of every leaf secret under a root path.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::errors::{Error, Result};
use crate::namespace::{join, trim_separator, NamespaceMap};
use crate::store::{Dialect, SecretStore};

/// Whether leaf payloads are fetched during the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Record leaves as placeholders; payloads are read later by the workers
    Lazy,
    /// Read every leaf as it is discovered
    Eager,
}

/// Depth-first namespace walker.
///
/// The traversal keeps its own stack instead of recursing, tracks every
/// directory it has listed, and gives up with [`Error::CycleDetected`] when a
/// directory repeats or nesting exceeds `max_depth`.
#[derive(Debug, Clone, Copy)]
pub struct TreeWalker {
    max_depth: usize,
}

impl TreeWalker {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Enumerate every leaf under `root`.
    ///
    /// `root` is a listing path (for versioned mounts, `<mount>/metadata`);
    /// the keys of the returned map are I/O paths for `dialect`.
    #[instrument(skip(self, store))]
    pub async fn walk(
        &self,
        store: &dyn SecretStore,
        root: &str,
        dialect: Dialect,
        mode: WalkMode,
    ) -> Result<NamespaceMap> {
        let mut map = NamespaceMap::new();
        let mut visited = HashSet::new();
        let mut pending = vec![(trim_separator(root).to_string(), 0usize)];

        while let Some((path, depth)) = pending.pop() {
            if depth > self.max_depth {
                return Err(Error::cycle(
                    path,
                    format!("namespace deeper than {} levels", self.max_depth),
                ));
            }
            if !visited.insert(path.clone()) {
                return Err(Error::cycle(path, "directory listed twice"));
            }

            let entries = store.list(&path).await?;
            if entries.is_empty() {
                debug!(%path, "No entries");
                continue;
            }

            for entry in entries {
                let child = join(&path, &entry.name);
                if entry.is_directory {
                    pending.push((trim_separator(&child).to_string(), depth + 1));
                    continue;
                }

                let io_path = dialect.io_path(&child);
                match mode {
                    WalkMode::Lazy => map.insert_placeholder(io_path),
                    WalkMode::Eager => {
                        let payload = store.read(&io_path).await?;
                        map.insert(io_path, payload);
                    }
                }
            }
        }

        debug!(root, leaves = map.len(), directories = visited.len(), "Walk finished");
        Ok(map)
    }
}
