//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing or parsing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: u32 },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream in the middle of a frame.
    #[error("incomplete message: expected {expected} bytes, got {received}")]
    IncompleteMessage { expected: usize, received: usize },

    #[error("empty message")]
    EmptyMessage,

    #[error("timeout during {operation}")]
    Timeout { operation: String },
}

impl ProtocolError {
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}
