//! Secret store adapters.
//!
//! This module defines the boundary between the sync engine and a remote
//! secret store. The engine only ever talks to a [`SecretStore`]:
//! - **list**: child entries of a path, each flagged directory or leaf
//! - **read**: the payload held at a leaf path
//! - **write**: store a payload at a leaf path
//! - **describe_mount**: the KV [`Dialect`] and root of the mount
//!
//! # Supported Backends
//!
//! - **HashiCorp Vault** ([`VaultStore`]): the HTTP API, KV v1 or v2
//! - **In-memory** ([`MemoryStore`]): deterministic store for tests and rehearsals
//!
//! Handles are opened through a [`StoreConnector`] so the engine can hold one
//! connection per worker instead of sharing a single client.

pub mod dialect;
pub mod memory;
pub mod vault;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::namespace::{is_directory, trim_separator, SecretPayload};

pub use dialect::{Dialect, MountInfo};
pub use memory::MemoryStore;
pub use vault::{VaultConnector, VaultStore};

/// One child returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListEntry {
    /// Child name without the trailing directory marker
    pub name: String,
    /// Whether the child can itself be listed
    pub is_directory: bool,
}

impl ListEntry {
    /// Parse a raw listing key such as `app/` or `password`.
    pub fn parse(raw: &str) -> Self {
        Self { name: trim_separator(raw).to_string(), is_directory: is_directory(raw) }
    }

    pub fn leaf(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_directory: false }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_directory: true }
    }
}

/// Capability set of a hierarchical secret store.
///
/// Implementations must not retry failed calls; callers decide what a failure
/// means for the run.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List the children of `path`. An absent or empty path yields an empty list.
    async fn list(&self, path: &str) -> Result<Vec<ListEntry>>;

    /// Read the payload stored at a leaf I/O path.
    async fn read(&self, path: &str) -> Result<SecretPayload>;

    /// Write a payload to a leaf I/O path, replacing what is there.
    async fn write(&self, path: &str, payload: &SecretPayload) -> Result<()>;

    /// Determine the dialect and KV root of this store.
    ///
    /// When `root_override` is set the mount table is not consulted.
    async fn describe_mount(&self, root_override: Option<&str>) -> Result<MountInfo>;
}

/// Opens independent handles to one store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SecretStore>>;

    /// Human readable target, used in logs
    fn target(&self) -> String;
}

/// Open `size` handles through `connector`, one per worker.
pub async fn connect_pool(
    connector: &dyn StoreConnector,
    size: usize,
) -> Result<Vec<Arc<dyn SecretStore>>> {
    let mut handles = Vec::with_capacity(size);
    for _ in 0..size {
        handles.push(connector.connect().await?);
    }
    tracing::debug!(target_store = %connector.target(), handles = size, "Opened store handles");
    Ok(handles)
}
