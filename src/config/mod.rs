//! # Configuration Management
//!
//! Settings for one sync action plus logging configuration. Everything is
//! validated before a single store connection is opened.

pub mod settings;

pub use settings::{
    ObservabilityConfig, SourceConfig, SyncAction, SyncSettings, VaultConfig,
    DEFAULT_LIST_OUTPUT_FILE, DEFAULT_MAX_DEPTH, DEFAULT_WORKERS,
};
