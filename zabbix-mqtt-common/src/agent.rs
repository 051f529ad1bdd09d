//! Trapper discovery from a Zabbix agent configuration file.

use std::path::Path;

use crate::error::{Error, Result};
use crate::sender::{SenderError, ServerAddr};

/// Agent configuration used when discovery is enabled without a path.
pub const DEFAULT_AGENT_CONFIG: &str = "/etc/zabbix/zabbix_agentd.conf";

/// Fallback when the agent configuration has no `ServerActive` line.
const DEFAULT_SERVER_ACTIVE: &str = "127.0.0.1:10051";

/// Read `ServerActive` from an agent configuration file.
pub fn load_server_active(path: impl AsRef<Path>) -> Result<Vec<ServerAddr>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read agent config '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(parse_server_active(&content)?)
}

/// Extract the trapper endpoints from agent configuration text.
///
/// The file is `Key=value` lines with `#` comments. The last `ServerActive`
/// line wins, and its comma-separated entries are all returned.
pub fn parse_server_active(content: &str) -> std::result::Result<Vec<ServerAddr>, SenderError> {
    let value = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| key.trim() == "ServerActive")
        .map(|(_, value)| value.trim())
        .next_back()
        .unwrap_or(DEFAULT_SERVER_ACTIVE);

    let servers = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<Vec<ServerAddr>, _>>()?;

    if servers.is_empty() {
        return Err(SenderError::NoServers);
    }

    Ok(servers)
}
