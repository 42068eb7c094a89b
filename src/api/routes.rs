use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::api::{handlers, ws};
use crate::error::GatewayResult;
use crate::logic::{CommandRouter, CommandRouterBuilder, Gateway};
use crate::store::{DataSource, Delegate};

/// Shared state of the HTTP and WebSocket transports.
pub struct AppState<S: DataSource, D: Delegate> {
    pub gateway: Arc<Gateway<S, D>>,
    pub commands: Arc<CommandRouter>,
}

impl<S: DataSource, D: Delegate> AppState<S, D> {
    /// Host commands are matched first; the built-in request command
    /// catches whatever they leave.
    pub fn new(
        gateway: Arc<Gateway<S, D>>,
        host_commands: CommandRouterBuilder,
    ) -> GatewayResult<Self> {
        let commands = host_commands
            .command(
                ws::REQUEST_COMMAND_PATTERN,
                ws::request_command(Arc::clone(&gateway)),
            )?
            .build();
        log::debug!("Registered {} WebSocket commands", commands.len());
        Ok(Self {
            gateway,
            commands: Arc::new(commands),
        })
    }
}

pub fn create_router<S: DataSource, D: Delegate>(state: Arc<AppState<S, D>>) -> Router {
    let config = state.gateway.config();
    let websocket_path = format!("/{}", config.websocket_path.trim_matches('/'));
    let timeout = Duration::from_secs(config.request_timeout_secs);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route(&websocket_path, get(ws::ws_handler::<S, D>))
        // Everything else is a resource, search or function path
        .fallback(handlers::handle_resource::<S, D>)
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
