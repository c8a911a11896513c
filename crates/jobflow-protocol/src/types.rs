//! Request and response types for the jobflow protocol.

use chrono::{DateTime, Utc};
use jobflow_core::JobRecord;
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Message envelope wrapping all protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version (always "1" for v1).
    pub protocol_version: String,
    /// Request id, echoed back in the response.
    pub request_id: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn request(request_id: impl Into<String>, request: T) -> Self {
        Self::new(request_id, request)
    }

    pub fn response(request_id: impl Into<String>, response: T) -> Self {
        Self::new(request_id, response)
    }

    /// Checks if this envelope uses a compatible protocol version.
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Requests accepted by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Queue a captured job and start a sync pass.
    SaveJob { data: JobRecord },

    /// Ask whether a token can be obtained without user interaction.
    GetAuthStatus,

    /// Run the interactive authorization flow.
    RequestAuth,

    /// Counts of queue items per status.
    GetQueueStatus,

    /// Run a sync pass now.
    SyncQueue,

    /// Skip scheduled passes until resumed. Explicit syncs still run.
    PauseSync,

    ResumeSync,

    /// Daemon status.
    Status,

    Shutdown,

    Ping,
}

impl Request {
    pub fn save_job(data: JobRecord) -> Self {
        Self::SaveJob { data }
    }
}

/// Responses sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Outcome of a save, auth or sync action.
    Action {
        #[serde(flatten)]
        result: ActionResult,
    },

    AuthStatus { authenticated: bool },

    QueueStatus {
        #[serde(flatten)]
        stats: QueueStats,
    },

    Status {
        #[serde(flatten)]
        info: StatusInfo,
    },

    Ok,

    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },

    Pong,
}

impl Response {
    pub fn action(result: ActionResult) -> Self {
        Self::Action { result }
    }

    pub fn auth_status(authenticated: bool) -> Self {
        Self::AuthStatus { authenticated }
    }

    pub fn queue_status(stats: QueueStats) -> Self {
        Self::QueueStatus { stats }
    }

    pub fn status(info: StatusInfo) -> Self {
        Self::Status { info }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    /// False for protocol errors and for actions that reported failure.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Error { .. } => false,
            Self::Action { result } => result.success,
            _ => true,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// `{success, error?}` reply to an action request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Number of queue items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub succeeded: usize,
    /// Items that became failed during the pass.
    pub failed: usize,
    /// Items still pending after the pass.
    pub still_pending: usize,
}

impl SyncSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.still_pending
    }
}

/// Daemon status information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub uptime_seconds: u64,

    /// When the last sync pass finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<SyncSummary>,

    /// Error that aborted the last pass, if it was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Scheduled syncs are paused.
    #[serde(default)]
    pub paused: bool,

    pub queue: QueueStats,
}

impl StatusInfo {
    pub fn new(uptime_seconds: u64, queue: QueueStats) -> Self {
        Self {
            uptime_seconds,
            last_sync: None,
            last_summary: None,
            last_error: None,
            paused: false,
            queue,
        }
    }

    pub fn with_last_sync(mut self, last_sync: DateTime<Utc>) -> Self {
        self.last_sync = Some(last_sync);
        self
    }

    pub fn with_last_summary(mut self, summary: SyncSummary) -> Self {
        self.last_summary = Some(summary);
        self
    }

    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

/// Error codes for protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    /// The frame was not a request this daemon understands.
    InvalidRequest,
    ShuttingDown,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::InternalError => "An internal error occurred",
            Self::InvalidRequest => "The request was invalid",
            Self::ShuttingDown => "Server is shutting down",
        }
    }
}

/// Error response details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for ErrorResponse {}
