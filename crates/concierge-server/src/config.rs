//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (`PORT`, `CONCIERGE_*` defaults and
//!   `CONCIERGE__SECTION__KEY` overrides)
//! - TOML configuration file
//! - The `--config <path>` command line argument

use anyhow::{bail, Context, Result};
use concierge_core::RelayConfig;
use concierge_protocol::codec::DEFAULT_MAX_PAYLOAD_SIZE;
use concierge_protocol::topic::validate_client_id;
use concierge_protocol::ArrayPolicy;
use concierge_transport::DEFAULT_EVENT_BUFFER;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP facade configuration.
    #[serde(default)]
    pub http: HttpConfig,

    /// Bus connection configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Relay behavior.
    #[serde(default)]
    pub relay: RelaySettings,

    /// Browser client configuration served at `/bus-config.js`.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP facade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static files to serve, if any.
    #[serde(default)]
    pub static_dir: Option<String>,
}

/// Bus connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker url. `nats://` and `tls://` connect to NATS, `memory://`
    /// runs an in-process loopback bus.
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// The relay's identity on the bus.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Capacity of the inbound event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Relay behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Game topic namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Prefix of broker system topics.
    #[serde(default = "default_system_prefix")]
    pub system_prefix: String,

    /// Recency window in milliseconds.
    #[serde(default = "default_recency_window")]
    pub recency_window_ms: u64,

    /// How array payloads are relayed.
    #[serde(default)]
    pub array_policy: ArrayPolicy,

    /// Maximum inbound payload size in bytes.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
}

/// Browser client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// User name browsers connect with.
    #[serde(default = "default_browser_user")]
    pub user_name: String,

    /// Password browsers connect with.
    #[serde(default = "default_browser_password")]
    pub password: String,

    /// WebSocket port; derived from the bus port when unset.
    #[serde(default)]
    pub ws_port: Option<u16>,

    /// Whether browsers should connect over TLS.
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("CONCIERGE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_bus_url() -> String {
    std::env::var("CONCIERGE_BUS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_client_id() -> String {
    std::env::var("CONCIERGE_CLIENT_ID").unwrap_or_else(|_| "concierge".to_string())
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_namespace() -> String {
    "gigascapes".to_string()
}

fn default_system_prefix() -> String {
    "$SYS".to_string()
}

fn default_recency_window() -> u64 {
    60_000 // 1 minute
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

fn default_browser_user() -> String {
    "browser-ws".to_string()
}

fn default_browser_password() -> String {
    std::env::var("CONCIERGE_WS_PASSWORD").unwrap_or_else(|_| "nopassword".to_string())
}

fn default_use_ssl() -> bool {
    std::env::var("CONCIERGE_ENV").is_ok_and(|env| env == "production")
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            client_id: default_client_id(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            system_prefix: default_system_prefix(),
            recency_window_ms: default_recency_window(),
            array_policy: ArrayPolicy::default(),
            max_payload_size: default_max_payload_size(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_name: default_browser_user(),
            password: default_browser_password(),
            ws_port: None,
            use_ssl: default_use_ssl(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Reads `explicit` if given, otherwise the first existing default
    /// config file, then applies `CONCIERGE__SECTION__KEY` environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be parsed or the result is
    /// invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let base = match explicit.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        let config: Config = config::Config::builder()
            .add_source(
                config::Config::try_from(&base).context("Failed to layer configuration")?,
            )
            .add_source(
                config::Environment::with_prefix("CONCIERGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file. Missing keys take their defaults and no
    /// validation is done; [`Config::load`] validates after overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check values that would make the relay misbehave.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if let Err(reason) = validate_client_id(&self.bus.client_id) {
            bail!("Invalid bus.client_id {:?}: {}", self.bus.client_id, reason);
        }
        if let Err(reason) = validate_client_id(&self.relay.namespace) {
            bail!("Invalid relay.namespace {:?}: {}", self.relay.namespace, reason);
        }
        if self.relay.system_prefix.is_empty() {
            bail!("relay.system_prefix cannot be empty");
        }
        if self.relay.recency_window_ms == 0 {
            bail!("relay.recency_window_ms must be positive");
        }
        Ok(())
    }

    /// Get the socket address to bind the HTTP facade to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.host, self.http.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.http.host, self.http.port))
    }

    /// Relay engine configuration.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            namespace: self.relay.namespace.clone(),
            self_id: self.bus.client_id.clone(),
            system_prefix: self.relay.system_prefix.clone(),
            recency_window: Duration::from_millis(self.relay.recency_window_ms),
            array_policy: self.relay.array_policy,
            max_payload_size: self.relay.max_payload_size,
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    let config_paths = [
        "concierge.toml",
        "/etc/concierge/concierge.toml",
        "~/.config/concierge/concierge.toml",
    ];

    config_paths
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.recency_window_ms, 60_000);
        assert_eq!(config.relay.namespace, "gigascapes");
        assert_eq!(config.relay.array_policy, ArrayPolicy::StampEntries);
        assert!(config.metrics.enabled);
        assert!(config.browser.ws_port.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [http]
            host = "0.0.0.0"
            port = 8000

            [bus]
            url = "memory://"
            client_id = "lobby-concierge"

            [relay]
            namespace = "gs"
            recency_window_ms = 5000
            array_policy = "drop"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8000);
        assert_eq!(config.bus.url, "memory://");
        assert!(config.validate().is_ok());

        let relay = config.relay_config();
        assert_eq!(relay.self_id, "lobby-concierge");
        assert_eq!(relay.namespace, "gs");
        assert_eq!(relay.recency_window, Duration::from_secs(5));
        assert_eq!(relay.array_policy, ArrayPolicy::Drop);
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.http.host = "127.0.0.1".to_string();
        config.http.port = 3000;
        assert_eq!(config.bind_addr().unwrap().port(), 3000);

        config.http.host = "not a host".to_string();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_identity() {
        let mut config = Config::default();
        config.bus.client_id = "concierge/+".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.recency_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!("concierge-test-{}.toml", std::process::id()));
        std::fs::write(&path, "[relay]\nnamespace = \"arena\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.relay.namespace, "arena");
        assert_eq!(config.relay.recency_window_ms, 60_000);

        let from_file = Config::from_file(&path).unwrap();
        assert_eq!(from_file.relay.namespace, "arena");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_validates_file_values() {
        let path = std::env::temp_dir().join(format!("concierge-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[bus]\nclient_id = \"a/b\"\n").unwrap();

        // Parsing alone accepts it; loading rejects it.
        assert_eq!(Config::from_file(&path).unwrap().bus.client_id, "a/b");
        assert!(Config::load(Some(&path)).is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
