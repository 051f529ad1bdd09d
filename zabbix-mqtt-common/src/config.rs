use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default log file, written next to the working directory.
pub const DEFAULT_LOG_FILE: &str = "zabbix-mqtt-client.log";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,

    /// File sink. `null` keeps console output only.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_LOG_FILE))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: default_log_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> T {
        json5::from_str(content).unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_default_logging() {
        let config: Wrapper = parse_config("{}");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.logging.file, Some(PathBuf::from(DEFAULT_LOG_FILE)));
    }

    #[test]
    fn test_json_logging_format() {
        let json5 = r#"
        {
            logging: {
                level: "debug",
                format: "json",
                file: null,
            },
        }
        "#;

        let config: Wrapper = parse_config(json5);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_plain_json_accepted() {
        let json = r#"{"logging": {"level": "warn", "file": "/tmp/relay.log"}}"#;
        let config: Wrapper = parse_config(json);

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/relay.log")));
    }
}
