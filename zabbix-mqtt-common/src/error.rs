use thiserror::Error;

use crate::sender::SenderError;

/// Common error type for the relay components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zabbix sender error: {0}")]
    Sender(#[from] SenderError),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
