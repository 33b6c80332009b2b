//! # Structured Logging
//!
//! Subscriber setup and span macros. Every action runs inside an
//! `action_span!` and every worker task inside a `worker_span!`, so log lines
//! can be grouped by run and by worker in either output format.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Create a tracing span for one sync action
#[macro_export]
macro_rules! action_span {
    ($action:expr) => {
        tracing::info_span!("sync_action", action = %$action)
    };
    ($action:expr, $($field:tt)*) => {
        tracing::info_span!("sync_action", action = %$action, $($field)*)
    };
}

/// Create a tracing span for one pool worker
#[macro_export]
macro_rules! worker_span {
    ($role:expr, $worker_id:expr) => {
        tracing::info_span!("worker", role = %$role, worker_id = $worker_id)
    };
    ($role:expr, $worker_id:expr, $($field:tt)*) => {
        tracing::info_span!("worker", role = %$role, worker_id = $worker_id, $($field)*)
    };
}

/// Build the filter: `RUST_LOG` wins over the configured level.
fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e))),
    }
}

/// Install the global subscriber.
///
/// Calling this again (e.g. from tests) is not an error; the first
/// subscriber stays installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(config)?;

    let installed = if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false)).try_init()
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed; keeping it");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = action_span!("copy");
        let _span = action_span!("copy", workers = 4);
        let _span = worker_span!("write", 0);
        let _span = worker_span!("dump", 3, keys = 12);
    }

    #[test]
    fn test_invalid_level_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = ObservabilityConfig {
            log_level: "vaultsync=notalevel".to_string(),
            json_logging: false,
        };
        assert!(matches!(init_logging(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_configured_level_builds_filter() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = ObservabilityConfig { log_level: "vaultsync=debug,warn".to_string(), ..Default::default() };
        let filter = env_filter(&config).unwrap();
        assert!(filter.to_string().contains("vaultsync=debug"));
    }
}
