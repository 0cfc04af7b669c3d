use std::io;
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("terminal io failed: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Misconfiguration exits with 2 so wrappers can tell it apart from runtime failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_use_their_own_exit_code() {
        assert_eq!(CliError::Config(ConfigError::MissingSessionId).exit_code(), 2);
        assert_eq!(CliError::Logging("nope".into()).exit_code(), 1);
        assert_eq!(
            CliError::Transport(TransportError::NotConnected).exit_code(),
            1
        );
    }
}
