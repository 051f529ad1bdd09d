//! Configuration for the MQTT to Zabbix relay.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zabbix_mqtt_common::config::LoggingConfig;
use zabbix_mqtt_common::sender::{DEFAULT_CHUNK_SIZE, DEFAULT_TRAPPER_PORT};
use zabbix_mqtt_common::{DEFAULT_AGENT_CONFIG, ServerAddr, ZabbixSender, load_server_active};

use crate::mapping::{KeySpec, TopicMapping};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT port when TLS is enabled.
pub const DEFAULT_MQTT_TLS_PORT: u16 = 8883;

/// Default limit for a single MQTT packet, in either direction.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Zabbix server discovery failed: {0}")]
    Discovery(#[from] zabbix_mqtt_common::Error),
}

/// Complete client configuration.
///
/// A missing `zabbix` or `mqtt` section leaves that side of the relay
/// unconfigured; the process still runs with reduced functionality.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Topic to item key mapping.
    #[serde(default)]
    pub topics: TopicMapping,

    /// Zabbix trapper settings.
    #[serde(default)]
    pub zabbix: Option<ZabbixConfig>,

    /// MQTT broker settings.
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to discover trapper endpoints from a Zabbix agent config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AgentConfigSource {
    /// `true` reads the default agent configuration, `false` disables discovery.
    Enabled(bool),
    /// Explicit path to an agent configuration file.
    Path(PathBuf),
}

impl AgentConfigSource {
    /// Resolve to a file path, if discovery is enabled.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            AgentConfigSource::Enabled(true) => Some(PathBuf::from(DEFAULT_AGENT_CONFIG)),
            AgentConfigSource::Enabled(false) => None,
            AgentConfigSource::Path(path) => Some(path.clone()),
        }
    }
}

/// Zabbix trapper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ZabbixConfig {
    /// Trapper host (server or proxy).
    #[serde(default)]
    pub server: Option<String>,

    /// Trapper port (default 10051).
    #[serde(default)]
    pub port: Option<u16>,

    /// Read `ServerActive` from a Zabbix agent config instead of `server`.
    #[serde(default)]
    pub agent_config: Option<AgentConfigSource>,

    /// Host name the items belong to in Zabbix.
    #[serde(default)]
    pub host: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum metrics per request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_timeout() -> u64 {
    10
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl ZabbixConfig {
    /// Trapper port, falling back to the Zabbix default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_TRAPPER_PORT)
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Host name reported with every metric.
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    /// Resolve trapper endpoints and build the sender.
    ///
    /// The agent configuration, when enabled, takes precedence over `server`.
    /// Returns `None` when neither is set.
    pub fn build_sender(&self) -> Result<Option<ZabbixSender>, ConfigError> {
        let agent_config = self.agent_config.as_ref().and_then(AgentConfigSource::path);

        let servers = match (agent_config, &self.server) {
            (Some(path), _) => load_server_active(path)?,
            (None, Some(server)) => vec![ServerAddr::new(server.clone(), self.port())],
            (None, None) => return Ok(None),
        };

        Ok(Some(
            ZabbixSender::new(servers)
                .with_timeout(self.timeout())
                .with_chunk_size(self.chunk_size),
        ))
    }
}

/// MQTT broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host name.
    #[serde(default = "default_mqtt_server")]
    pub server: String,

    /// Broker port (1883, or 8883 with TLS).
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Connect with TLS using the platform root certificates.
    #[serde(default)]
    pub tls: bool,

    /// Client identifier (generated from the process id when absent).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Pause after a connection error before polling again.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Largest packet accepted from or sent to the broker, in bytes.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_mqtt_server() -> String {
    "localhost".to_string()
}

fn default_keepalive() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    2
}

fn default_max_packet_size() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: default_mqtt_server(),
            port: None,
            username: None,
            password: None,
            tls: false,
            client_id: None,
            keepalive_secs: default_keepalive(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl MqttConfig {
    pub fn port(&self) -> u16 {
        match (self.port, self.tls) {
            (Some(port), _) => port,
            (None, true) => DEFAULT_MQTT_TLS_PORT,
            (None, false) => DEFAULT_MQTT_PORT,
        }
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("zabbix-mqtt-client-{}", std::process::id()))
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl ClientConfig {
    /// Load configuration from a JSON (or JSON5) file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (topic, spec) in self.topics.iter() {
            if topic.is_empty() {
                return Err(ConfigError::Validation(
                    "Topic names cannot be empty".to_string(),
                ));
            }

            match spec {
                KeySpec::Single(key) if key.is_empty() => {
                    return Err(ConfigError::Validation(format!(
                        "Topic '{}' has an empty item key",
                        topic
                    )));
                }
                KeySpec::Fields(fields) if fields.is_empty() => {
                    return Err(ConfigError::Validation(format!(
                        "Topic '{}' maps no JSON fields",
                        topic
                    )));
                }
                _ => {}
            }
        }

        if let Some(zabbix) = &self.zabbix {
            if zabbix.timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "zabbix.timeout_secs must be > 0".to_string(),
                ));
            }

            if zabbix.chunk_size == 0 {
                return Err(ConfigError::Validation(
                    "zabbix.chunk_size must be > 0".to_string(),
                ));
            }
        }

        if let Some(mqtt) = &self.mqtt {
            if mqtt.server.is_empty() {
                return Err(ConfigError::Validation(
                    "mqtt.server cannot be empty".to_string(),
                ));
            }

            // rumqttc refuses keep-alive intervals under 5 seconds.
            if mqtt.keepalive_secs < 5 {
                return Err(ConfigError::Validation(
                    "mqtt.keepalive_secs must be >= 5".to_string(),
                ));
            }

            if mqtt.max_packet_size == 0 {
                return Err(ConfigError::Validation(
                    "mqtt.max_packet_size must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
