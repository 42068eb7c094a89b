pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

use axum::serve;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use api::routes::{create_router, AppState};
pub use config::{AppConfig, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use logic::{CommandRouter, Gateway};
pub use model::*;
pub use store::{DataSource, Delegate, MemoryStore, Transaction};

/// Assemble the gateway for a host model and serve it over HTTP and
/// WebSocket until the listener fails.
pub async fn run_server<S: DataSource, D: Delegate>(
    model: &[EntityDef],
    source: Arc<S>,
    delegate: Arc<D>,
    host_commands: logic::CommandRouterBuilder,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.server_address()).await?;
    let app = build_app(model, source, delegate, host_commands, config)?;

    log::info!("Resource gateway listening on {}", listener.local_addr()?);
    if config.tls.is_configured() {
        log::info!(
            "TLS material configured (chain: {:?}); terminate TLS in front of this server",
            config.tls.certificate_chain
        );
    }

    serve(listener, app).await?;
    Ok(())
}

/// Router for a host model, with host commands registered ahead of the
/// built-in request command.
pub fn build_app<S: DataSource, D: Delegate>(
    model: &[EntityDef],
    source: Arc<S>,
    delegate: Arc<D>,
    host_commands: logic::CommandRouterBuilder,
    config: &AppConfig,
) -> GatewayResult<axum::Router> {
    let gateway = Gateway::from_model(model, source, delegate, config.gateway.clone())?;
    for schema in gateway.registry().entities() {
        log::info!(
            "Serving {} at /{} (functions: {:?})",
            schema.name,
            schema.resource_path,
            schema.functions
        );
    }
    let state = AppState::new(Arc::new(gateway), host_commands)?;
    Ok(create_router(Arc::new(state)))
}
