use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::errors::{Error, Result};

use super::routes::build_router;
use super::ControlState;

pub async fn start_control_server(bind_address: &str, state: ControlState) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| Error::config(format!("Invalid bind address '{}': {}", bind_address, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind control server to {}: {}", addr, e)))?;

    info!(address = %addr, "Starting HTTP control server");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Control server shutdown listener failed");
            }
        })
        .await
        .map_err(|e| Error::internal(format!("Control server error: {}", e)))?;

    info!("Control server shutdown completed");
    Ok(())
}
