//! # Configuration Settings
//!
//! Defines the settings structures for vaultsync actions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::planner::DiffPolicy;

/// Default number of parallel workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default file written by the list action
pub const DEFAULT_LIST_OUTPUT_FILE: &str = "/tmp/vaultsync.out";

/// Default bound on namespace nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Environment prefix for all vaultsync variables
pub const ENV_PREFIX: &str = "VAULTSYNC";

/// The action a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Dump the source tree to a snapshot file
    List,
    /// Write missing (or differing) source keys to the destination
    Copy,
    /// Copy, and report destination-only keys as deletion candidates
    Mirror,
}

impl SyncAction {
    pub fn writes_destination(self) -> bool {
        matches!(self, SyncAction::Copy | SyncAction::Mirror)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::List => f.write_str("list"),
            SyncAction::Copy => f.write_str("copy"),
            SyncAction::Mirror => f.write_str("mirror"),
        }
    }
}

impl FromStr for SyncAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "list" => Ok(SyncAction::List),
            "copy" => Ok(SyncAction::Copy),
            "mirror" => Ok(SyncAction::Mirror),
            other => Err(Error::config(format!(
                "Unsupported action '{}'. Use 'list', 'copy' or 'mirror'.",
                other
            ))),
        }
    }
}

/// Connection settings for one Vault server
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    pub address: String,

    /// Vault authentication token
    pub token: String,

    /// Vault namespace (for Enterprise multi-tenancy)
    #[serde(default)]
    pub namespace: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &if self.token.is_empty() { "" } else { "[REDACTED]" })
            .field("namespace", &self.namespace)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            namespace: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }

    /// Load a server configuration from environment variables.
    ///
    /// Uses `VAULTSYNC_<ROLE>_VAULT_ADDR`, `VAULTSYNC_<ROLE>_VAULT_TOKEN` and
    /// `VAULTSYNC_<ROLE>_VAULT_NAMESPACE`. Returns `None` when no address is set.
    pub fn from_env(role: &str) -> Option<Self> {
        let var = |name: &str| std::env::var(format!("{}_{}_VAULT_{}", ENV_PREFIX, role, name)).ok();

        let address = var("ADDR")?;
        let token = var("TOKEN").unwrap_or_default();
        let namespace = var("NAMESPACE");

        Some(Self { address, token, namespace, timeout_seconds: default_timeout_seconds() })
    }

    fn is_complete(&self) -> bool {
        !self.address.is_empty() && !self.token.is_empty()
    }
}

/// Where the source tree comes from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    /// A live Vault server
    Vault(VaultConfig),
    /// A snapshot file produced by the list action
    File(PathBuf),
}

/// Settings for one sync action
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncSettings {
    /// Number of parallel workers (and store handles per side)
    #[validate(range(min = 1, message = "workers must be > 0"))]
    pub workers: usize,

    pub action: SyncAction,

    pub source: SourceConfig,

    /// Required for copy and mirror
    pub destination: Option<VaultConfig>,

    /// Explicit KV mount root, skips mount discovery
    pub kv_root: Option<String>,

    pub diff_policy: DiffPolicy,

    /// Snapshot file written by the list action
    pub list_output_file: PathBuf,

    /// Maximum namespace depth before the walk is aborted
    #[validate(range(min = 1, message = "max_depth must be > 0"))]
    pub max_depth: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            action: SyncAction::List,
            source: SourceConfig::Vault(VaultConfig::new("http://127.0.0.1:8200", "")),
            destination: None,
            kv_root: None,
            diff_policy: DiffPolicy::Presence,
            list_output_file: PathBuf::from(DEFAULT_LIST_OUTPUT_FILE),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SyncSettings {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Cross-field rules the validator attributes cannot express
    fn validate_custom(&self) -> Result<()> {
        match (&self.source, self.action) {
            (SourceConfig::File(_), SyncAction::List) => {
                return Err(Error::config(
                    "A source snapshot file must be used together with copy or mirror",
                ));
            }
            (SourceConfig::File(path), _) if path.as_os_str().is_empty() => {
                return Err(Error::config("Source snapshot file path cannot be empty"));
            }
            (SourceConfig::Vault(source), _) if !source.is_complete() => {
                return Err(Error::config("Source Vault address and token are required"));
            }
            _ => {}
        }

        if self.action.writes_destination() {
            match &self.destination {
                None => {
                    return Err(Error::config(format!(
                        "A destination Vault is required for {}",
                        self.action
                    )))
                }
                Some(destination) if destination.address.is_empty() => {
                    return Err(Error::config("Unspecified destination Vault address"))
                }
                Some(destination) if destination.token.is_empty() => {
                    return Err(Error::config("Unspecified destination Vault token"))
                }
                Some(_) => {}
            }
        }

        if matches!(&self.kv_root, Some(root) if root.trim_matches('/').is_empty()) {
            return Err(Error::config("KV root override cannot be empty"));
        }

        Ok(())
    }

    /// Convert a signed worker count from user input.
    pub fn workers_from(value: i64) -> Result<usize> {
        usize::try_from(value).ok().filter(|workers| *workers > 0).ok_or_else(|| {
            Error::config(format!("Illegal value {} for workers; it must be > 0", value))
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

impl ObservabilityConfig {
    /// Create from `VAULTSYNC_LOG_LEVEL` and `VAULTSYNC_LOG_JSON`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_level =
            std::env::var(format!("{}_LOG_LEVEL", ENV_PREFIX)).unwrap_or(defaults.log_level);

        let json_logging = std::env::var(format!("{}_LOG_JSON", ENV_PREFIX))
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.json_logging);

        Self { log_level, json_logging }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_settings() -> SyncSettings {
        SyncSettings {
            action: SyncAction::Copy,
            source: SourceConfig::Vault(VaultConfig::new("http://src:8200", "src-token")),
            destination: Some(VaultConfig::new("http://dst:8200", "dst-token")),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_copy_settings() {
        assert!(copy_settings().validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = SyncSettings { workers: 0, ..copy_settings() };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("workers")));
    }

    #[test]
    fn test_workers_from_signed() {
        assert_eq!(SyncSettings::workers_from(4).unwrap(), 4);
        assert!(SyncSettings::workers_from(0).is_err());
        assert!(SyncSettings::workers_from(-3).is_err());
    }

    #[test]
    fn test_copy_requires_destination() {
        let settings = SyncSettings { destination: None, ..copy_settings() };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let settings = SyncSettings {
            destination: Some(VaultConfig::new("http://dst:8200", "")),
            ..copy_settings()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_file_source_only_with_copy() {
        let settings = SyncSettings {
            action: SyncAction::List,
            source: SourceConfig::File(PathBuf::from("/tmp/in.txt")),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let settings = SyncSettings {
            source: SourceConfig::File(PathBuf::from("/tmp/in.txt")),
            ..copy_settings()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_list_needs_no_destination() {
        let settings = SyncSettings {
            action: SyncAction::List,
            source: SourceConfig::Vault(VaultConfig::new("http://src:8200", "t")),
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("Mirror".parse::<SyncAction>().unwrap(), SyncAction::Mirror);
        assert!("sync".parse::<SyncAction>().is_err());
    }

    #[test]
    fn test_vault_config_debug_redacts_token() {
        let debug = format!("{:?}", VaultConfig::new("http://a", "s.very-secret"));
        assert!(!debug.contains("s.very-secret"));
    }

    #[test]
    fn test_vault_config_from_env() {
        std::env::set_var("VAULTSYNC_ENVTEST_VAULT_ADDR", "http://env:8200");
        std::env::set_var("VAULTSYNC_ENVTEST_VAULT_TOKEN", "env-token");

        let config = VaultConfig::from_env("ENVTEST").unwrap();
        assert_eq!(config.address, "http://env:8200");
        assert_eq!(config.token, "env-token");
        assert!(config.namespace.is_none());

        std::env::remove_var("VAULTSYNC_ENVTEST_VAULT_ADDR");
        std::env::remove_var("VAULTSYNC_ENVTEST_VAULT_TOKEN");
        assert!(VaultConfig::from_env("ENVTEST").is_none());
    }
}
