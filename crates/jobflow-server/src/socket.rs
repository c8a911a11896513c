//! Unix socket listener for IPC.

use std::path::Path;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use jobflow_protocol::{
    ActionResult, Envelope, ErrorCode, PROTOCOL_VERSION, Request, Response, read_frame_bytes,
    write_frame,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Unix socket server for handling client connections.
pub struct SocketServer {
    config: ServerConfig,
    listener: UnixListener,
    /// Limits concurrent connections.
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds to the configured socket path.
    ///
    /// With `cleanup_stale_socket`, a socket file nobody answers on is
    /// removed first; a live one is an error either way.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if config.cleanup_stale_socket && socket_path.exists() {
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(ServerError::socket_in_use(
                        socket_path.to_string_lossy().to_string(),
                    ));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "Removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        } else if socket_path.exists() {
            return Err(ServerError::socket_in_use(
                socket_path.to_string_lossy().to_string(),
            ));
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Socket server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Accepts a single connection.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, _addr) = self.listener.accept().await?;
        debug!("Accepted new connection");

        Ok(Connection {
            stream,
            timeout: self.config.connection_timeout,
            _permit: permit,
        })
    }

    /// Runs the accept loop, spawning `handler` for each connection.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(path = %self.config.socket_path.display(), "Removed socket file");
            }
        }
    }
}

/// A client connection to the server.
pub struct Connection {
    stream: UnixStream,
    timeout: std::time::Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Reads a request envelope.
    ///
    /// Frames that arrive whole but do not decode as a request are answered
    /// here and skipped; the connection stays open. Returns `Ok(None)` if the
    /// client closed the connection.
    pub async fn read_request(&mut self) -> ServerResult<Option<Envelope<Request>>> {
        loop {
            let Some(frame) = read_frame_bytes(&mut self.stream, self.timeout).await? else {
                return Ok(None);
            };

            let envelope: Envelope<Request> = match serde_json::from_slice(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let (request_id, response) = reject_malformed(&frame, &e);
                    warn!(request_id = %request_id, error = %e, "Malformed request");
                    self.respond(request_id, response).await?;
                    continue;
                }
            };

            if !envelope.is_compatible() {
                warn!(
                    version = %envelope.protocol_version,
                    expected = %PROTOCOL_VERSION,
                    "Incompatible protocol version"
                );
            }
            return Ok(Some(envelope));
        }
    }

    pub async fn write_response(&mut self, envelope: &Envelope<Response>) -> ServerResult<()> {
        write_frame(&mut self.stream, envelope, self.timeout).await?;
        Ok(())
    }

    /// Sends `response` tagged with `request_id`.
    pub async fn respond(
        &mut self,
        request_id: impl Into<String>,
        response: Response,
    ) -> ServerResult<()> {
        let envelope = Envelope::response(request_id, response);
        self.write_response(&envelope).await
    }
}

/// The reply to a frame that is not a valid request.
///
/// Captures get the usual `{success: false, error}` action result; anything
/// else gets an `invalid_request` error. The request id is echoed when the
/// frame is JSON that carries one.
fn reject_malformed(frame: &[u8], error: &serde_json::Error) -> (String, Response) {
    let value: serde_json::Value = serde_json::from_slice(frame).unwrap_or_default();
    let request_id = value
        .get("request_id")
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string();

    let is_capture = value.pointer("/payload/type").and_then(|t| t.as_str()) == Some("save_job");
    let response = if is_capture {
        Response::action(ActionResult::failed(format!("invalid job data: {error}")))
    } else {
        Response::error(ErrorCode::InvalidRequest, error.to_string())
    };
    (request_id, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_protocol::read_frame;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn socket_server_creates_socket_file() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = SocketServer::new(ServerConfig::new(&socket_path)).await.unwrap();

        assert!(socket_path.exists());
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn socket_server_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(false);
        let _server = SocketServer::new(config.clone()).await.unwrap();

        let result = SocketServer::new(config).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn socket_server_cleans_stale_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(true);
        let server = SocketServer::new(config).await.unwrap();

        assert!(socket_path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn socket_server_requires_parent_dir() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("missing").join("test.sock");

        let result = SocketServer::new(ServerConfig::new(&socket_path)).await;
        assert!(matches!(result, Err(ServerError::SocketPathInvalid { .. })));
    }

    #[tokio::test]
    async fn connection_roundtrip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let config =
            ServerConfig::new(&socket_path).with_connection_timeout(Duration::from_secs(5));
        let server = SocketServer::new(config).await.unwrap();

        let client_path = socket_path.clone();
        let client_task = tokio::spawn(async move {
            let mut stream = UnixStream::connect(&client_path).await.unwrap();
            let timeout = Duration::from_secs(5);

            let request = Envelope::request("test-1", Request::GetQueueStatus);
            write_frame(&mut stream, &request, timeout).await.unwrap();

            let response: Envelope<Response> =
                read_frame(&mut stream, timeout).await.unwrap().unwrap();
            assert_eq!(response.request_id, "test-1");
            assert_eq!(response.payload, Response::Pong);
        });

        let mut conn = server.accept().await.unwrap();
        let request = conn.read_request().await.unwrap().unwrap();
        assert_eq!(request.payload, Request::GetQueueStatus);

        conn.respond(&request.request_id, Response::Pong).await.unwrap();

        client_task.await.unwrap();
    }

    /// Writes `body` as one frame, bypassing request encoding.
    async fn write_raw(stream: &mut UnixStream, body: &[u8]) {
        use tokio::io::AsyncWriteExt;
        stream.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frames_are_answered_and_skipped() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path)).await.unwrap();

        let client_path = socket_path.clone();
        let client_task = tokio::spawn(async move {
            let mut stream = UnixStream::connect(&client_path).await.unwrap();
            let timeout = Duration::from_secs(5);

            write_raw(&mut stream, b"not json").await;
            let reply: Envelope<Response> =
                read_frame(&mut stream, timeout).await.unwrap().unwrap();
            assert_eq!(reply.request_id, "");
            assert_eq!(reply.payload.as_error().unwrap().code, ErrorCode::InvalidRequest);

            write_raw(
                &mut stream,
                br#"{"protocol_version":"1","request_id":"r-2","payload":{"type":"reboot"}}"#,
            )
            .await;
            let reply: Envelope<Response> =
                read_frame(&mut stream, timeout).await.unwrap().unwrap();
            assert_eq!(reply.request_id, "r-2");
            assert_eq!(reply.payload.as_error().unwrap().code, ErrorCode::InvalidRequest);

            let ping = Envelope::request("r-3", Request::Ping);
            write_frame(&mut stream, &ping, timeout).await.unwrap();
            let reply: Envelope<Response> =
                read_frame(&mut stream, timeout).await.unwrap().unwrap();
            assert_eq!(reply.request_id, "r-3");
        });

        let mut conn = server.accept().await.unwrap();
        let request = conn.read_request().await.unwrap().unwrap();
        assert_eq!(request.payload, Request::Ping);
        conn.respond(&request.request_id, Response::Pong).await.unwrap();

        client_task.await.unwrap();
    }

    #[test]
    fn malformed_capture_gets_an_action_reply() {
        let frame = br#"{"protocol_version":"1","request_id":"r-1","payload":{"type":"save_job","data":{"url":"https://indeed.com/j/1","platform":"Indeed"}}}"#;
        let error = serde_json::from_slice::<Envelope<Request>>(frame).unwrap_err();

        let (request_id, response) = reject_malformed(frame, &error);
        assert_eq!(request_id, "r-1");
        let Response::Action { result } = response else {
            panic!("expected action response");
        };
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("invalid job data:"));
    }

    #[tokio::test]
    async fn connection_handles_client_disconnect() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = SocketServer::new(ServerConfig::new(&socket_path)).await.unwrap();

        let client_path = socket_path.clone();
        let handle = tokio::spawn(async move {
            let _stream = UnixStream::connect(&client_path).await.unwrap();
        });

        let mut conn = server.accept().await.unwrap();
        handle.await.unwrap();

        assert!(conn.read_request().await.unwrap().is_none());
    }
}
