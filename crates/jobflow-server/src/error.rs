//! Server error types.

use std::io;
use thiserror::Error;

use jobflow_core::JobError;
use jobflow_sink::SinkError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] jobflow_protocol::ProtocolError),

    /// The captured record cannot be queued.
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] JobError),

    /// Token acquisition or sink failure that ends a sync pass.
    #[error("Sync error: {0}")]
    Sink(#[from] SinkError),

    /// The queue file could not be read or written.
    #[error("Queue storage error at {path}: {message}")]
    Storage { path: String, message: String },

    /// No queue item with this id.
    #[error("Queue item not found: {id}")]
    ItemNotFound { id: String },

    /// Socket path already in use.
    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory does not exist.
    #[error("Socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    /// Server is already running.
    #[error("Server is already running (PID file exists: {path})")]
    AlreadyRunning { path: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("Server shutdown requested")]
    Shutdown,
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn item_not_found(id: impl Into<String>) -> Self {
        Self::ItemNotFound { id: id.into() }
    }

    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    pub fn already_running(path: impl Into<String>) -> Self {
        Self::AlreadyRunning { path: path.into() }
    }

    /// True when the error means no usable credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Sink(e) if e.code().is_auth())
    }
}
