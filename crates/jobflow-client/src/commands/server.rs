//! Server command: runs the daemon in the foreground.
//!
//! Wires the daemon together:
//! - PID file (prevents duplicate instances)
//! - Signal handler (SIGTERM/SIGINT for shutdown, SIGHUP for reload)
//! - Identity backend, Sheets client and desktop notifier from config
//! - Durable queue and sync engine
//! - Scheduler (periodic sync passes)
//! - Socket server (IPC with clients)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use jobflow_server::{
    DesktopNotifier, DurableQueue, JsonFileStore, PidFile, RequestHandler, Scheduler,
    SchedulerConfig, ServerConfig, SignalHandler, SocketServer, SyncEngine, default_pid_path,
    make_connection_handler, new_scheduler_state, new_shared_state,
};
use jobflow_sink::{IdentityBackend, SheetsClient, TokenProvider};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Runs the daemon until SIGTERM/SIGINT or a `shutdown` request.
pub async fn run(socket_override: Option<&Path>, config: &ClientConfig) -> ClientResult<()> {
    // 1. Sink and identity from config
    let sheets = config.sheets.to_sheets_config().map_err(ClientError::Config)?;
    info!(
        spreadsheet = %sheets.spreadsheet_id,
        range = %sheets.range,
        "Using spreadsheet"
    );
    let sink = Arc::new(SheetsClient::new(sheets)?);
    let tokens = Arc::new(TokenProvider::new(build_identity(config)?));

    // 2. PID file
    let _pid_file = PidFile::create(default_pid_path())
        .map_err(|e| ClientError::Config(format!("failed to create PID file: {e}")))?;

    // 3. Queue and engine
    let queue_path = config.queue.path();
    let queue = Arc::new(DurableQueue::open(
        Box::new(JsonFileStore::new(&queue_path)),
        config.queue.max_synced,
    )?);
    info!(path = %queue_path.display(), stats = ?queue.stats().await, "Queue loaded");

    let notifier = Arc::new(DesktopNotifier::new(config.notifications.to_notify_config()));
    let engine = Arc::new(SyncEngine::new(
        queue,
        tokens.clone(),
        sink,
        notifier,
        config.sync.to_sync_config(&config.queue),
    ));

    // 4. Signal handler
    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    // 5. Scheduler
    let sync_state = new_scheduler_state();
    let scheduler = Scheduler::with_state(
        SchedulerConfig::new(config.sync.interval()),
        sync_state.clone(),
    );
    let scheduler_handle = scheduler.handle();

    let pass_engine = engine.clone();
    let scheduler_task = tokio::spawn(scheduler.run(move || {
        let engine = pass_engine.clone();
        async move { engine.drain_pending().await.map_err(|e| e.to_string()) }
    }));

    // 6. SIGHUP: forget the cached token and sync
    let mut reloads = signal_handler.reloads();
    let reload_handle = scheduler_handle.clone();
    tokio::spawn(async move {
        while reloads.next().await {
            info!("Reload requested, dropping cached token");
            tokens.invalidate().await;
            if reload_handle.sync_now().await.is_err() {
                break;
            }
        }
    });

    // 7. Socket server
    let socket_path = config.socket_path(socket_override);
    let server = SocketServer::new(ServerConfig::new(&socket_path))
        .await
        .map_err(|e| ClientError::Config(format!("failed to start socket server: {e}")))?;

    info!(path = %socket_path.display(), "Daemon listening");

    let handler = Arc::new(
        RequestHandler::with_sync_state(new_shared_state(), engine, sync_state)
            .with_scheduler(scheduler_handle.clone())
            .with_shutdown_handle(signal_handler.shutdown_handle()),
    );

    server
        .run_until_shutdown(make_connection_handler(handler), signal_handler.shutdown().wait())
        .await?;

    info!("Shutting down...");
    if let Err(e) = scheduler_handle.stop().await {
        warn!(error = %e, "Failed to send stop command to scheduler");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_task).await;

    info!("Daemon stopped");
    Ok(())
}

#[cfg(feature = "google")]
fn build_identity(config: &ClientConfig) -> ClientResult<Arc<dyn IdentityBackend>> {
    use jobflow_sink::google::GoogleIdentity;

    let google = config.google.as_ref().ok_or_else(|| {
        ClientError::Config(
            "no Google account configured; run `jobflow auth google` first".to_string(),
        )
    })?;
    let auth_config = google
        .to_auth_config()
        .map_err(|e| ClientError::Config(format!("invalid Google configuration: {e}")))?;

    let identity = GoogleIdentity::new(auth_config)?;
    if identity.has_stored_tokens() {
        info!("Google identity ready (authorized)");
    } else {
        warn!(
            "Google identity has no stored tokens; the first sync will open the browser, \
             or run `jobflow auth google`"
        );
    }
    Ok(Arc::new(identity))
}

#[cfg(not(feature = "google"))]
fn build_identity(_config: &ClientConfig) -> ClientResult<Arc<dyn IdentityBackend>> {
    Err(ClientError::Config(
        "built without an identity backend; enable the `google` feature".to_string(),
    ))
}
