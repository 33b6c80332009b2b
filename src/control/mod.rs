//! # HTTP Control Surface
//!
//! Optional axum server that triggers actions over HTTP:
//!
//! - `GET /health`
//! - `POST /api/v1/list`: runs a list and returns the snapshot text
//! - `POST /api/v1/copy`, `POST /api/v1/mirror`: return the run summary as
//!   JSON, `207 Multi-Status` when some keys failed
//!
//! Only one action runs at a time; a request arriving while another holds the
//! [`ActionGuard`] gets `409` with `{"error": "busy"}`.

pub mod error;
pub mod guard;
pub mod handlers;
pub mod routes;
pub mod server;

use std::sync::Arc;

use crate::config::{SyncSettings, VaultConfig};
use crate::store::{StoreConnector, VaultConnector};

pub use error::ApiError;
pub use guard::{ActionGuard, ActionPermit};
pub use routes::build_router;
pub use server::start_control_server;

/// Turns the server configuration in a request into a store connector.
pub trait ConnectorFactory: Send + Sync {
    fn connector(&self, config: &VaultConfig) -> Box<dyn StoreConnector>;
}

/// Connects to real Vault servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultConnectors;

impl ConnectorFactory for VaultConnectors {
    fn connector(&self, config: &VaultConfig) -> Box<dyn StoreConnector> {
        Box::new(VaultConnector::new(config.clone()))
    }
}

/// Shared state of the control router
#[derive(Clone)]
pub struct ControlState {
    pub guard: ActionGuard,
    /// Worker count, depth bound and output file used when a request omits them
    pub defaults: Arc<SyncSettings>,
    pub connectors: Arc<dyn ConnectorFactory>,
}

impl ControlState {
    pub fn new(defaults: SyncSettings) -> Self {
        Self::with_connectors(defaults, Arc::new(VaultConnectors))
    }

    pub fn with_connectors(defaults: SyncSettings, connectors: Arc<dyn ConnectorFactory>) -> Self {
        Self { guard: ActionGuard::new(), defaults: Arc::new(defaults), connectors }
    }
}
