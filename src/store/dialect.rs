//! KV engine dialects and the path rewriting between them.
//!
//! A flat (KV v1) mount reads, writes and lists on the same path. A versioned
//! (KV v2) mount lists under `<root>/metadata/...` and stores payloads under
//! `<root>/data/...`; its reads come back wrapped in a `{data, metadata}`
//! envelope and its writes expect `{data}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result, StoreOperation};
use crate::namespace::{join, trim_separator, SecretPayload, SEPARATOR};

/// Listing/metadata segment of a versioned mount
pub const METADATA_SEGMENT: &str = "metadata";

/// Payload segment of a versioned mount
pub const DATA_SEGMENT: &str = "data";

/// Envelope field holding the secret data in versioned payloads
pub const DATA_FIELD: &str = "data";

/// Namespace convention of a KV mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// KV v1: one path for list, read and write
    Flat,
    /// KV v2: `metadata/` for listing, `data/` for I/O
    Versioned,
}

impl Dialect {
    /// Classify a server by its version string, e.g. `1.15.2+ent` or `0.9.5 (cluster)`.
    ///
    /// Servers from 0.10 onwards expose the versioned KV API.
    pub fn from_server_version(version: &str) -> Result<Self> {
        let malformed = |reason: &str| {
            Error::store(
                StoreOperation::DescribeMount,
                "sys/health",
                format!("malformed version string '{}': {}", version, reason),
            )
        };

        let release = version.split_whitespace().next().ok_or_else(|| malformed("empty"))?;
        let release = release.trim_start_matches('v');
        let mut parts = release.split('.');

        let major: u64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| malformed("major version is not a number"))?;
        let minor: u64 = parts
            .next()
            .map(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>())
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| malformed("minor version is not a number"))?;

        if major > 0 || minor >= 10 {
            Ok(Dialect::Versioned)
        } else {
            Ok(Dialect::Flat)
        }
    }

    /// Path the walker starts listing from for a mount rooted at `root`.
    pub fn listing_root(self, root: &str) -> String {
        match self {
            Dialect::Flat => trim_separator(root).to_string(),
            Dialect::Versioned => join(root, METADATA_SEGMENT),
        }
    }

    /// Rewrite a listing path into the path used for reads and writes.
    ///
    /// For versioned mounts the first `metadata` segment becomes `data`.
    pub fn io_path(self, listing_path: &str) -> String {
        match self {
            Dialect::Flat => listing_path.to_string(),
            Dialect::Versioned => {
                let mut replaced = false;
                listing_path
                    .split(SEPARATOR)
                    .map(|segment| {
                        if !replaced && segment == METADATA_SEGMENT {
                            replaced = true;
                            DATA_SEGMENT
                        } else {
                            segment
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("/")
            }
        }
    }

    /// The secret data proper, without any versioned envelope.
    pub fn secret_data(self, payload: &SecretPayload) -> SecretPayload {
        match self {
            Dialect::Flat => payload.clone(),
            Dialect::Versioned => match payload.get(DATA_FIELD) {
                Some(Value::Object(data)) => data.clone(),
                _ => SecretPayload::new(),
            },
        }
    }

    /// Wrap bare secret data the way a live read from this dialect returns it.
    pub fn envelope(self, data: SecretPayload) -> SecretPayload {
        match self {
            Dialect::Flat => data,
            Dialect::Versioned => {
                let mut wrapped = SecretPayload::new();
                wrapped.insert(DATA_FIELD.to_string(), Value::Object(data));
                wrapped
            }
        }
    }

    /// Body to send when writing `payload`; drops read-only envelope fields.
    pub fn write_body(self, payload: &SecretPayload) -> SecretPayload {
        match self {
            Dialect::Flat => payload.clone(),
            Dialect::Versioned => self.envelope(self.secret_data(payload)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Flat => f.write_str("flat"),
            Dialect::Versioned => f.write_str("versioned"),
        }
    }
}

/// Dialect and root of one KV mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub dialect: Dialect,
    /// Mount path without trailing separator, e.g. `secret`
    pub root: String,
}

impl MountInfo {
    pub fn new(dialect: Dialect, root: &str) -> Self {
        Self { dialect, root: trim_separator(root).to_string() }
    }

    pub fn listing_root(&self) -> String {
        self.dialect.listing_root(&self.root)
    }
}

impl fmt::Display for MountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mount at '{}'", self.dialect, self.root)
    }
}
