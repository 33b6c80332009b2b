//! # vaultsync
//!
//! Copies the secrets held in a HashiCorp Vault KV mount from one Vault
//! instance to another, or dumps a source tree into a line-oriented snapshot
//! file that can later be replayed into a destination without a live source.
//!
//! ## Architecture
//!
//! ```text
//! CLI / HTTP control ─→ Pipeline ─→ Store adapters (dialect + root)
//!                          │
//!                          ├─→ TreeWalker ──→ NamespaceMap ─┐
//!                          ├─→ Snapshot codec ──────────────┤
//!                          │                                ▼
//!                          └─→ Planner ─→ work set ─→ partitioned workers
//! ```
//!
//! ## Core Components
//!
//! - **Store adapter** ([`store`]): wraps a Vault endpoint, detects whether the
//!   KV mount speaks the flat (v1) or versioned (v2) dialect, and rewrites
//!   `metadata/` listing paths into `data/` I/O paths.
//! - **Tree walker** ([`walker`]): enumerates every leaf secret under a root.
//! - **Snapshot codec** ([`snapshot`]): `path SPACE json` lines.
//! - **Planner** ([`planner`]): selects the keys that must be written.
//! - **Engine** ([`engine`]): fixed pool of workers, one store handle each.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use vaultsync::config::{SourceConfig, SyncAction, SyncSettings, VaultConfig};
//! use vaultsync::pipeline::Pipeline;
//!
//! # async fn run() -> vaultsync::Result<()> {
//! let settings = SyncSettings {
//!     action: SyncAction::Copy,
//!     source: SourceConfig::Vault(VaultConfig::new("https://vault-a:8200", "s.token-a")),
//!     destination: Some(VaultConfig::new("https://vault-b:8200", "s.token-b")),
//!     ..Default::default()
//! };
//! let summary = Pipeline::from_settings(settings)?.run().await?;
//! println!("copied {} keys", summary.report.copied());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod namespace;
pub mod observability;
pub mod pipeline;
pub mod planner;
pub mod snapshot;
pub mod store;
pub mod walker;

// Re-export commonly used types
pub use errors::{Error, Result};
pub use namespace::{NamespaceMap, SecretPayload};
pub use store::{Dialect, MountInfo, SecretStore};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
