//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use crate::config::DEFAULT_CONFIG_FILE;

/// MQTT client for Zabbix.
#[derive(Parser, Debug, Clone)]
#[command(name = "zabbix-mqtt-client")]
#[command(about = "Relay MQTT topic values to Zabbix trapper items")]
#[command(version)]
pub struct ClientArgs {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Verbose output (debug logging).
    #[arg(short, long)]
    pub verbose: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<Level>,
}

impl ClientArgs {
    /// Parse CLI arguments.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Log level requested on the command line, if any.
    ///
    /// `--log-level` wins over `-v`.
    pub fn log_level_override(&self) -> Option<String> {
        self.log_level
            .or_else(|| self.verbose.then_some(Level::DEBUG))
            .map(|level| level.as_str().to_lowercase())
    }
}
