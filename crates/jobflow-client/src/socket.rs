//! Unix socket client for the jobflow daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, warn};
use uuid::Uuid;

use jobflow_protocol::{Envelope, Request, Response, read_frame, write_frame};

use crate::error::{ClientError, ClientResult};

/// How long requests that may wait on a sync pass or the consent flow are
/// given.
pub const SLOW_REQUEST_TIMEOUT: Duration = Duration::from_secs(330);

/// Opens a fresh connection for every request.
pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// The default socket path with a 5 second timeout.
    pub fn with_defaults() -> Self {
        Self::new(jobflow_server::default_socket_path(), Duration::from_secs(5))
    }

    /// The same client with another timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(&self.socket_path, timeout)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Sends a request and waits for the response.
    pub async fn send(&self, request: Request) -> ClientResult<Response> {
        let request_id = Uuid::new_v4().to_string();
        let envelope = Envelope::request(&request_id, request);

        debug!(
            socket = %self.socket_path.display(),
            request_id = %request_id,
            "connecting to daemon"
        );

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!(
                    "failed to connect to {}: {e} (is `jobflow server` running?)",
                    self.socket_path.display()
                ))
            })?;

        write_frame(&mut stream, &envelope, self.timeout).await?;
        debug!("request sent, waiting for response");

        let response: Envelope<Response> = read_frame(&mut stream, self.timeout)
            .await?
            .ok_or_else(|| ClientError::Connection("daemon closed the connection".into()))?;

        if response.request_id != request_id {
            warn!(
                expected = %request_id,
                received = %response.request_id,
                "response request_id mismatch"
            );
        }

        match response.payload {
            Response::Error { error } => Err(ClientError::Daemon(error.to_string())),
            payload => Ok(payload),
        }
    }

    /// True if the daemon answers.
    pub async fn ping(&self) -> bool {
        matches!(self.send(Request::Ping).await, Ok(Response::Pong))
    }
}
