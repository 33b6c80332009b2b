//! # Observability Infrastructure
//!
//! Structured logging for vaultsync. Per-key outcomes are also returned to
//! callers in a [`crate::engine::CopyReport`], so logs are for operators,
//! not the only record of what happened.

pub mod logging;

pub use logging::init_logging;
