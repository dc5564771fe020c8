//! Error types for the financial chat relay

use crate::models::ConnectionId;
use thiserror::Error;

/// Result type alias for chat relay operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {

    // =============================
    // Session Protocol Errors
    // =============================

    #[error("Connection {0} already owns a session")]
    DuplicateSession(ConnectionId),

    #[error("Session for connection {0} has not been initialized")]
    UninitializedSession(ConnectionId),

    #[error("Session for connection {0} is closed")]
    SessionClosed(ConnectionId),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // =============================
    // Provider Errors
    // =============================

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Client protocol violations are answered with an outbound error frame
    /// carrying the error text itself; everything else gets a generic notice.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ChatError::DuplicateSession(_)
                | ChatError::UninitializedSession(_)
                | ChatError::SessionClosed(_)
                | ChatError::InvalidMessage(_)
        )
    }

    /// Map a reqwest failure onto the provider taxonomy.
    pub(crate) fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::ProviderTimeout(format!("{} request timed out", provider))
        } else {
            ChatError::ProviderError(format!("{} request failed: {}", provider, err))
        }
    }
}
