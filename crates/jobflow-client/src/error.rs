//! Client error types.

use std::fmt;

use jobflow_protocol::ProtocolError;
use jobflow_sink::SinkError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Identity or sink setup failed.
    Sink(SinkError),
    Io(std::io::Error),
    /// Connection to the daemon failed.
    Connection(String),
    /// Framing or encoding error.
    Protocol(ProtocolError),
    /// The daemon answered, but the request did not succeed.
    Daemon(String),
    /// A local action (opening the browser) failed.
    Action(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Sink(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Daemon(msg) => write!(f, "daemon error: {msg}"),
            Self::Action(msg) => write!(f, "action failed: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sink(err) => Some(err),
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SinkError> for ClientError {
    fn from(err: SinkError) -> Self {
        Self::Sink(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<jobflow_server::ServerError> for ClientError {
    fn from(err: jobflow_server::ServerError) -> Self {
        Self::Daemon(err.to_string())
    }
}
