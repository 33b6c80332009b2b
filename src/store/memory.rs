//! In-memory secret store.
//!
//! Emulates a single KV mount of either dialect, including the versioned
//! `metadata/` vs `data/` split and the `{data, metadata}` read envelope.
//! Reads and writes can be made to fail for chosen keys to exercise the
//! engine's partial-failure handling.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::dialect::{DATA_SEGMENT, METADATA_SEGMENT};
use super::{Dialect, ListEntry, MountInfo, SecretStore, StoreConnector};
use crate::errors::{Error, Result, StoreOperation};
use crate::namespace::{join, trim_separator, SecretPayload, SEPARATOR};

#[derive(Debug, Clone)]
struct StoredSecret {
    data: SecretPayload,
    version: u64,
}

/// A single KV mount held in memory.
#[derive(Debug)]
pub struct MemoryStore {
    mount: MountInfo,
    secrets: RwLock<BTreeMap<String, StoredSecret>>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new(mount: MountInfo) -> Self {
        Self {
            mount,
            secrets: RwLock::new(BTreeMap::new()),
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Empty KV v1 mount at `root`
    pub fn flat(root: &str) -> Self {
        Self::new(MountInfo::new(Dialect::Flat, root))
    }

    /// Empty KV v2 mount at `root`
    pub fn versioned(root: &str) -> Self {
        Self::new(MountInfo::new(Dialect::Versioned, root))
    }

    /// Seed a secret by its key relative to the mount, e.g. `app/db`.
    pub fn with_secret(mut self, key: &str, data: SecretPayload) -> Self {
        self.secrets
            .get_mut()
            .insert(trim_separator(key).to_string(), StoredSecret { data, version: 1 });
        self
    }

    /// Make every read of `key` fail.
    pub fn fail_reads_for(mut self, key: &str) -> Self {
        self.failing_reads.insert(key.to_string());
        self
    }

    /// Make every write of `key` fail.
    pub fn fail_writes_for(mut self, key: &str) -> Self {
        self.failing_writes.insert(key.to_string());
        self
    }

    /// Secret data held under `key`, without any envelope.
    pub async fn secret(&self, key: &str) -> Option<SecretPayload> {
        self.secrets.read().await.get(key).map(|s| s.data.clone())
    }

    /// All keys relative to the mount
    pub async fn keys(&self) -> Vec<String> {
        self.secrets.read().await.keys().cloned().collect()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Full I/O path of a mount-relative key.
    pub fn io_path(&self, key: &str) -> String {
        match self.mount.dialect {
            Dialect::Flat => join(&self.mount.root, key),
            Dialect::Versioned => join(&join(&self.mount.root, DATA_SEGMENT), key),
        }
    }

    /// Strip the mount root (and dialect segment) from `path`.
    fn relative(&self, path: &str, segment: Option<&str>, operation: StoreOperation) -> Result<String> {
        let path = trim_separator(path);
        let base = match segment {
            Some(segment) => join(&self.mount.root, segment),
            None => self.mount.root.clone(),
        };

        if path == base {
            return Ok(String::new());
        }
        path.strip_prefix(&base)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .map(str::to_string)
            .ok_or_else(|| Error::store(operation, path, format!("path is outside mount '{}'", base)))
    }

    fn listing_segment(&self) -> Option<&'static str> {
        match self.mount.dialect {
            Dialect::Flat => None,
            Dialect::Versioned => Some(METADATA_SEGMENT),
        }
    }

    fn io_segment(&self) -> Option<&'static str> {
        match self.mount.dialect {
            Dialect::Flat => None,
            Dialect::Versioned => Some(DATA_SEGMENT),
        }
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<Vec<ListEntry>> {
        let prefix = self.relative(path, self.listing_segment(), StoreOperation::List)?;
        let secrets = self.secrets.read().await;

        let mut children = BTreeSet::new();
        for key in secrets.keys() {
            let rest = if prefix.is_empty() {
                key.as_str()
            } else {
                match key.strip_prefix(&prefix).and_then(|r| r.strip_prefix(SEPARATOR)) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            match rest.split_once(SEPARATOR) {
                Some((dir, _)) => children.insert(ListEntry::directory(dir)),
                None => children.insert(ListEntry::leaf(rest)),
            };
        }

        Ok(children.into_iter().collect())
    }

    async fn read(&self, path: &str) -> Result<SecretPayload> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let key = self.relative(path, self.io_segment(), StoreOperation::Read)?;
        if self.failing_reads.contains(&key) {
            return Err(Error::store(StoreOperation::Read, path, "injected read failure"));
        }

        let secrets = self.secrets.read().await;
        let stored = secrets
            .get(&key)
            .ok_or_else(|| Error::store(StoreOperation::Read, path, "secret not found"))?;

        Ok(match self.mount.dialect {
            Dialect::Flat => stored.data.clone(),
            Dialect::Versioned => {
                let mut envelope = Dialect::Versioned.envelope(stored.data.clone());
                envelope.insert("metadata".to_string(), json!({ "version": stored.version }));
                envelope
            }
        })
    }

    async fn write(&self, path: &str, payload: &SecretPayload) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let key = self.relative(path, self.io_segment(), StoreOperation::Write)?;
        if key.is_empty() {
            return Err(Error::store(StoreOperation::Write, path, "cannot write to mount root"));
        }
        if self.failing_writes.contains(&key) {
            return Err(Error::store(StoreOperation::Write, path, "injected write failure"));
        }

        let data = match self.mount.dialect {
            Dialect::Flat => payload.clone(),
            Dialect::Versioned => match payload.get("data") {
                Some(Value::Object(data)) => data.clone(),
                _ => {
                    return Err(Error::store(
                        StoreOperation::Write,
                        path,
                        "versioned write requires a 'data' object",
                    ))
                }
            },
        };

        let mut secrets = self.secrets.write().await;
        let version = secrets.get(&key).map(|s| s.version + 1).unwrap_or(1);
        secrets.insert(key, StoredSecret { data, version });
        Ok(())
    }

    async fn describe_mount(&self, root_override: Option<&str>) -> Result<MountInfo> {
        Ok(match root_override {
            Some(root) => MountInfo::new(self.mount.dialect, root),
            None => self.mount.clone(),
        })
    }
}

#[async_trait]
impl StoreConnector for Arc<MemoryStore> {
    async fn connect(&self) -> Result<Arc<dyn SecretStore>> {
        let store: Arc<dyn SecretStore> = self.clone();
        Ok(store)
    }

    fn target(&self) -> String {
        format!("memory:{}", self.mount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::payload;

    #[tokio::test]
    async fn test_flat_list_read_write() {
        let store = MemoryStore::flat("secret")
            .with_secret("app/db", payload(json!({"user": "app"})))
            .with_secret("top", payload(json!({"k": 1})));

        let root = store.list("secret").await.unwrap();
        assert_eq!(root, vec![ListEntry::directory("app"), ListEntry::leaf("top")]);

        let nested = store.list("secret/app").await.unwrap();
        assert_eq!(nested, vec![ListEntry::leaf("db")]);

        assert!(store.list("secret/missing").await.unwrap().is_empty());

        store.write("secret/new", &payload(json!({"x": true}))).await.unwrap();
        assert_eq!(store.read("secret/new").await.unwrap(), payload(json!({"x": true})));
    }

    #[tokio::test]
    async fn test_versioned_envelope() {
        let store = MemoryStore::versioned("secret").with_secret("a", payload(json!({"k": 1})));

        assert_eq!(store.list("secret/metadata").await.unwrap(), vec![ListEntry::leaf("a")]);

        let read = store.read("secret/data/a").await.unwrap();
        assert_eq!(read.get("data"), Some(&json!({"k": 1})));
        assert_eq!(read.get("metadata"), Some(&json!({"version": 1})));

        store.write("secret/data/a", &payload(json!({"data": {"k": 2}}))).await.unwrap();
        let read = store.read("secret/data/a").await.unwrap();
        assert_eq!(read.get("metadata"), Some(&json!({"version": 2})));

        let err = store.write("secret/data/b", &payload(json!({"k": 2}))).await.unwrap_err();
        assert!(matches!(err, Error::Store { operation: StoreOperation::Write, .. }));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::flat("secret")
            .with_secret("a", payload(json!({"k": 1})))
            .fail_reads_for("a")
            .fail_writes_for("b");

        assert!(store.read("secret/a").await.is_err());
        assert!(store.write("secret/b", &payload(json!({}))).await.is_err());
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_path_outside_mount() {
        let store = MemoryStore::flat("secret");
        let err = store.list("other/path").await.unwrap_err();
        assert!(matches!(err, Error::Store { operation: StoreOperation::List, .. }));
    }
}
