//! Error types for campus-link.

use thiserror::Error;

/// Errors surfaced by construction, configuration and low-level connection APIs.
///
/// Binder-level operations never return these to application code; they
/// are logged and folded into health/fallback state instead.
#[derive(Error, Debug)]
pub enum CampusLinkError {
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CampusLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for CampusLinkError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigurationError(format!("Failed to parse config: {}", err))
    }
}

/// Result type for campus-link operations
pub type Result<T> = std::result::Result<T, CampusLinkError>;
