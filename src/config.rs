use serde::{Deserialize, Serialize};

use crate::logic::normalize_path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
}

/// Settings the gateway itself reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Path segment of the global search endpoint
    pub search_path: String,
    /// Path segment that upgrades to a WebSocket
    pub websocket_path: String,
    /// Attribute every entity is identified by
    pub resource_id_attribute: String,
    pub pretty_print_json: bool,
    pub request_timeout_secs: u64,
}

/// Certificate material handed to whatever terminates TLS in front of the
/// server. Only carried and logged here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub certificate_chain: Option<String>,
    pub private_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            search_path: "search".to_string(),
            websocket_path: "ws".to_string(),
            resource_id_attribute: "id".to_string(),
            pretty_print_json: false,
            request_timeout_secs: 30,
        }
    }
}

impl TlsConfig {
    pub fn is_configured(&self) -> bool {
        self.certificate_chain.is_some() && self.private_key.is_some()
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional config file and
    /// `GATEWAY_`-prefixed environment variables, in that order.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // Nested keys use a double underscore: GATEWAY_SERVER__PORT=0
        config = config.add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let search = normalize_path(&self.gateway.search_path)
            .ok_or_else(|| anyhow::anyhow!("Invalid search path '{}'", self.gateway.search_path))?;
        let websocket = normalize_path(&self.gateway.websocket_path).ok_or_else(|| {
            anyhow::anyhow!("Invalid websocket path '{}'", self.gateway.websocket_path)
        })?;
        if search == websocket {
            anyhow::bail!("Search path and websocket path are both '{}'", search);
        }
        if self.gateway.resource_id_attribute.trim().is_empty() {
            anyhow::bail!("resource_id_attribute must not be empty");
        }
        if self.tls.certificate_chain.is_some() != self.tls.private_key.is_some() {
            anyhow::bail!("TLS needs both certificate_chain and private_key");
        }
        Ok(())
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_address(), "127.0.0.1:3001");
        assert_eq!(config.gateway.search_path, "search");
        assert!(!config.tls.is_configured());
    }

    #[test]
    fn test_colliding_paths_rejected() {
        let mut config = AppConfig::default();
        config.gateway.websocket_path = "/search/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_tls_rejected() {
        let mut config = AppConfig::default();
        config.tls.certificate_chain = Some("chain.pem".to_string());
        assert!(config.validate().is_err());
        config.tls.private_key = Some("key.pem".to_string());
        assert!(config.validate().is_ok());
    }
}
