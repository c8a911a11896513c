//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,

    /// Connection timeout.
    pub connection_timeout: Duration,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Whether to remove stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            // A capture may wait on the browser consent flow.
            connection_timeout: Duration::from_secs(330),
            max_connections: 32,
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/jobflow.sock` if available,
/// otherwise falls back to `/tmp/jobflow-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    runtime_path("sock")
}

pub(crate) fn runtime_path(extension: &str) -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join(format!("jobflow.{extension}"))
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/jobflow-{uid}.{extension}"))
    }
}
