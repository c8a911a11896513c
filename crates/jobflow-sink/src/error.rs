//! Error types for token acquisition and sink calls.

use std::fmt;
use thiserror::Error;

/// The category of a sink error.
///
/// The sync engine branches on this: auth failures stop a pass,
/// [`SinkErrorCode::AuthExpired`] triggers one re-authorization, and the
/// remaining codes count as a failed attempt for the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkErrorCode {
    /// No token could be obtained without user interaction.
    AuthUnavailable,
    /// Interactive authorization was cancelled, refused or misconfigured.
    AuthDenied,
    /// The sink rejected the bearer token (HTTP 401).
    AuthExpired,
    /// No response: connection refused, DNS, timeout.
    Network,
    /// The sink answered with a non-success status.
    Api,
    /// A success status with a body that is not the expected JSON.
    InvalidResponse,
    Configuration,
    Internal,
}

impl SinkErrorCode {
    /// True for failures that mean "no usable credentials".
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthUnavailable | Self::AuthDenied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthUnavailable => "auth_unavailable",
            Self::AuthDenied => "auth_denied",
            Self::AuthExpired => "auth_expired",
            Self::Network => "network_error",
            Self::Api => "api_error",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for SinkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by a token backend or a sink.
#[derive(Debug, Error)]
pub struct SinkError {
    code: SinkErrorCode,
    message: String,
    /// HTTP status, when the sink answered.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SinkError {
    pub fn new(code: SinkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn auth_unavailable(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::AuthUnavailable, message)
    }

    pub fn auth_denied(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::AuthDenied, message)
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::AuthExpired, message).with_status(401)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::Api, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SinkErrorCode::Internal, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Re-labels this error under `code`, keeping the original as source.
    pub fn recode(self, code: SinkErrorCode) -> Self {
        if self.code == code {
            return self;
        }
        let message = self.message.clone();
        Self::new(code, message).with_source(self)
    }

    pub fn code(&self) -> SinkErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_auth_expired(&self) -> bool {
        self.code == SinkErrorCode::AuthExpired
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for token and sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
