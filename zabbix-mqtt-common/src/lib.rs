//! Common library for the MQTT to Zabbix relay.
//!
//! This crate provides the pieces that do not depend on the message bus:
//!
//! - [`metric`] - The `(host, key, value)` metric data model
//! - [`protocol`] - Zabbix sender protocol framing and response decoding
//! - [`sender`] - Trapper client with chunking and per-request timeouts
//! - [`agent`] - Trapper discovery from a Zabbix agent configuration file
//! - [`config`] - Logging settings shared by the binaries
//! - [`error`] - Error types

pub mod agent;
pub mod config;
pub mod error;
pub mod metric;
pub mod protocol;
pub mod sender;

use std::fs::OpenOptions;
use std::sync::Mutex;

// Re-export commonly used types at the crate root
pub use agent::{DEFAULT_AGENT_CONFIG, load_server_active, parse_server_active};
pub use config::{LogFormat, LoggingConfig};
pub use error::{Error, Result};
pub use metric::Metric;
pub use protocol::SenderResponse;
pub use sender::{DEFAULT_TRAPPER_PORT, SenderError, ServerAddr, ZabbixSender};

/// Targets that stay at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["rumqttc"];

/// Initialize tracing with the given configuration.
///
/// Log records go to stdout and, when `config.file` is set, are appended to
/// that file as well (without ANSI colours). Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Example
///
/// ```ignore
/// use zabbix_mqtt_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     format: LogFormat::Text,
///     file: Some("zabbix-mqtt-client.log".into()),
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = config.level.clone();
        for target in QUIET_TARGETS {
            directives.push_str(&format!(",{}=warn", target));
        }
        EnvFilter::new(directives)
    });

    let file = match &config.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!(
                        "Failed to open log file '{}': {}",
                        path.display(),
                        e
                    ))
                })?,
        ),
        None => None,
    };

    match config.format {
        LogFormat::Text => {
            let file_layer =
                file.map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f)));

            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(file_layer)
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            let file_layer = file.map(|f| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(f))
            });

            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stdout))
                .with(file_layer)
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
