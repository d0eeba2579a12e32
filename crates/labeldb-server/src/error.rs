//! Error types for the labeldb server.

use labeldb_store::StoreError;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric or enumerated setting is out of range
    #[error("Invalid value for --{name}: {reason}")]
    InvalidValue {
        /// Flag name without leading dashes
        name: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Missing required configuration value
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind HTTP server
    #[error("Failed to bind HTTP server to {addr}: {source}")]
    HttpBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Store error during startup or shutdown
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    Shutdown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::InvalidValue {
            name: "partitions",
            reason: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for --partitions: must be positive"
        );
    }

    #[test]
    fn test_server_error_conversion() {
        let store_err = StoreError::InvalidConfig("partition count must be positive".to_string());
        let server_err: ServerError = store_err.into();
        assert!(server_err.to_string().starts_with("Store error:"));
    }
}
