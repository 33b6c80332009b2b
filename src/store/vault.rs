//! HashiCorp Vault adapter over the HTTP API.
//!
//! Talks to the generic logical endpoints (`/v1/<path>`) rather than a typed
//! KV client, because the walker addresses arbitrary listing paths and the
//! same code must serve both KV v1 and KV v2 mounts.
//!
//! # Endpoints
//!
//! - `GET /v1/<path>?list=true`: listing, keys under `data.keys`
//! - `GET /v1/<path>`: read, payload under `data`
//! - `POST /v1/<path>`: write
//! - `GET /v1/sys/health`: server version
//! - `GET /v1/sys/mounts`: mount table
//!
//! # Security
//!
//! - Tokens are sent as `X-Vault-Token` and never logged
//! - Payloads are never logged, only paths and status codes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{ListEntry, MountInfo, SecretStore, StoreConnector};
use crate::config::VaultConfig;
use crate::errors::{Error, Result, StoreOperation};
use crate::namespace::{SecretPayload, SEPARATOR};
use crate::store::Dialect;

/// Mount type that identifies a KV secret engine
pub const KV_MOUNT_TYPE: &str = "kv";

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Option<SecretPayload>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    version: Option<String>,
}

/// One handle to a Vault server.
pub struct VaultStore {
    client: Client,
    base: Url,
    address: String,
    token: String,
    namespace: Option<String>,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl VaultStore {
    /// Build a handle for the configured server.
    ///
    /// No request is made here; an unreachable server surfaces on first use.
    pub fn connect(config: &VaultConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(Error::config("Vault address cannot be empty"));
        }
        let base = Url::parse(&config.address).map_err(|e| {
            Error::store(StoreOperation::Connect, &config.address, format!("invalid address: {}", e))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::store(
                StoreOperation::Connect,
                &config.address,
                "address must be an http(s) URL",
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::store(StoreOperation::Connect, &config.address, e))?;

        Ok(Self {
            client,
            base,
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            namespace: config.namespace.clone(),
        })
    }

    /// `/v1/<path>` under the server address, one URL segment per path
    /// segment so `#`, `?` and `%` in key names stay part of the key.
    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("v1")
                .extend(path.trim_start_matches(SEPARATOR).split(SEPARATOR));
        }
        url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "Vault request");

        let builder = self.client.request(method, url).header("X-Vault-Token", &self.token);
        match &self.namespace {
            Some(namespace) => builder.header("X-Vault-Namespace", namespace),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: StoreOperation,
        path: &str,
    ) -> Result<Response> {
        builder.send().await.map_err(|e| Error::store(operation, path, e))
    }

    /// Turn a non-success response into a store error carrying Vault's message.
    async fn failure(response: Response, operation: StoreOperation, path: &str) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("errors").cloned())
            .map(|errors| errors.to_string())
            .unwrap_or(body);
        Error::store(operation, path, format!("HTTP {}: {}", status, detail))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: Response,
        operation: StoreOperation,
        path: &str,
    ) -> Result<T> {
        let body = response.text().await.map_err(|e| Error::store(operation, path, e))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::store(operation, path, format!("unexpected response body: {}", e)))
    }

    async fn server_version(&self) -> Result<String> {
        const PATH: &str = "sys/health";
        let op = StoreOperation::DescribeMount;

        // Standby, sealed and performance-standby nodes answer with non-200
        // codes but the same JSON body, so any status with a version is fine.
        let response = self.send(self.request(Method::GET, PATH), op, PATH).await?;
        let health: HealthResponse = Self::json(response, op, PATH).await?;
        health.version.ok_or_else(|| Error::store(op, PATH, "health response has no version"))
    }

    async fn kv_root(&self) -> Result<String> {
        const PATH: &str = "sys/mounts";
        let op = StoreOperation::DescribeMount;

        let response = self.send(self.request(Method::GET, PATH), op, PATH).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, op, PATH).await);
        }
        let body: Value = Self::json(response, op, PATH).await?;
        find_kv_mount(&body).ok_or_else(|| {
            Error::store(op, PATH, format!("no mount of type '{}' found", KV_MOUNT_TYPE))
        })
    }
}

/// First mount (in path order) whose type is `kv`.
///
/// Newer servers nest the table under `data`; older ones return it top level.
fn find_kv_mount(body: &Value) -> Option<String> {
    let table = match body.get("data") {
        Some(Value::Object(data)) => data,
        _ => body.as_object()?,
    };

    let mut mounts: Vec<(&String, &Value)> = table.iter().collect();
    mounts.sort_by(|a, b| a.0.cmp(b.0));
    mounts
        .into_iter()
        .find(|(_, mount)| mount.get("type").and_then(Value::as_str) == Some(KV_MOUNT_TYPE))
        .map(|(path, _)| path.clone())
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn list(&self, path: &str) -> Result<Vec<ListEntry>> {
        let op = StoreOperation::List;
        let request = self.request(Method::GET, path).query(&[("list", "true")]);
        let response = self.send(request, op, path).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::failure(response, op, path).await);
        }

        let listing: ListResponse = Self::json(response, op, path).await?;
        Ok(listing
            .data
            .map(|data| data.keys.iter().map(|k| ListEntry::parse(k)).collect())
            .unwrap_or_default())
    }

    async fn read(&self, path: &str) -> Result<SecretPayload> {
        let op = StoreOperation::Read;
        let response = self.send(self.request(Method::GET, path), op, path).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::store(op, path, "secret not found"));
        }
        if !response.status().is_success() {
            return Err(Self::failure(response, op, path).await);
        }

        let secret: ReadResponse = Self::json(response, op, path).await?;
        secret.data.ok_or_else(|| Error::store(op, path, "response has no data"))
    }

    async fn write(&self, path: &str, payload: &SecretPayload) -> Result<()> {
        let op = StoreOperation::Write;
        let response = self.send(self.request(Method::POST, path).json(payload), op, path).await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, op, path).await);
        }
        Ok(())
    }

    async fn describe_mount(&self, root_override: Option<&str>) -> Result<MountInfo> {
        let version = self.server_version().await?;
        let dialect = Dialect::from_server_version(&version)?;

        let root = match root_override {
            Some(root) => root.to_string(),
            None => self.kv_root().await?,
        };

        let mount = MountInfo::new(dialect, &root);
        info!(address = %self.address, %version, %mount, "Resolved Vault KV mount");
        Ok(mount)
    }
}

/// Opens [`VaultStore`] handles for one server configuration.
#[derive(Debug, Clone)]
pub struct VaultConnector {
    config: VaultConfig,
}

impl VaultConnector {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreConnector for VaultConnector {
    async fn connect(&self) -> Result<Arc<dyn SecretStore>> {
        let store: Arc<dyn SecretStore> = Arc::new(VaultStore::connect(&self.config)?);
        Ok(store)
    }

    fn target(&self) -> String {
        self.config.address.clone()
    }
}
