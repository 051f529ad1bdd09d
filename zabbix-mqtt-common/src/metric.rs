use serde::Serialize;

/// A single value submitted to the monitoring backend.
///
/// Serializes to the item object of a Zabbix `sender data` request. No
/// `clock` is sent, so the server stamps the arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    /// Monitored host name as configured in Zabbix.
    pub host: String,

    /// Trapper item key (e.g., "sensor.temp").
    pub key: String,

    /// The value, always transmitted as text.
    pub value: String,
}

impl Metric {
    /// Create a metric.
    pub fn new(host: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}={}", self.host, self.key, self.value)
    }
}
