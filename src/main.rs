use resource_gateway::config::AppConfig;
use resource_gateway::logic::{CommandInvocation, CommandRouter};
use resource_gateway::seed::{self, NotesHost};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, search=/{}, websocket=/{}",
        config.server.host,
        config.server.port,
        config.gateway.search_path,
        config.gateway.websocket_path
    );

    let host = Arc::new(NotesHost::new());

    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        seed::load_seed_data(host.store());
    }

    let commands = CommandRouter::builder().command(r"^ping$", |_inv: CommandInvocation| async {
        Some("pong".to_string())
    })?;

    resource_gateway::run_server(
        &seed::notes_model(),
        Arc::clone(&host),
        host,
        commands,
        &config,
    )
    .await
}
