//! Request/response dispatch handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{Span, debug, info, warn};

use jobflow_protocol::{ActionResult, ErrorCode, Request, Response, StatusInfo, SyncSummary};

use crate::error::{ServerError, ServerResult};
use crate::scheduler::{SchedulerHandle, SharedSchedulerState, new_scheduler_state};
use crate::signals::ShutdownHandle;
use crate::socket::Connection;
use crate::sync::SyncEngine;

/// Process-wide state shared across connections.
#[derive(Debug)]
pub struct ServerState {
    start_time: DateTime<Utc>,
    shutdown_requested: bool,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            shutdown_requested: false,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        let duration = Utc::now() - self.start_time;
        duration.num_seconds().max(0) as u64
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }
}

/// Shared server state wrapped in an Arc<RwLock>.
pub type SharedState = Arc<RwLock<ServerState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(RwLock::new(ServerState::new()))
}

/// Turns requests into queue, auth and sync operations.
pub struct RequestHandler {
    state: SharedState,
    engine: Arc<SyncEngine>,
    sync_state: SharedSchedulerState,
    scheduler: Option<SchedulerHandle>,
    shutdown: Option<ShutdownHandle>,
}

impl RequestHandler {
    pub fn new(state: SharedState, engine: Arc<SyncEngine>) -> Self {
        Self::with_sync_state(state, engine, new_scheduler_state())
    }

    /// Shares pass bookkeeping with the scheduler so `status` reports both.
    pub fn with_sync_state(
        state: SharedState,
        engine: Arc<SyncEngine>,
        sync_state: SharedSchedulerState,
    ) -> Self {
        Self {
            state,
            engine,
            sync_state,
            scheduler: None,
            shutdown: None,
        }
    }

    /// Lets `pause_sync` / `resume_sync` reach the scheduler.
    pub fn with_scheduler(mut self, handle: SchedulerHandle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    /// Lets a `shutdown` request stop the daemon.
    pub fn with_shutdown_handle(mut self, handle: ShutdownHandle) -> Self {
        self.shutdown = Some(handle);
        self
    }

    /// Handles a single request and returns the response.
    #[tracing::instrument(skip(self), fields(request_type, duration_ms))]
    pub async fn handle(&self, request: &Request) -> Response {
        let start = std::time::Instant::now();
        let request_type = format!("{request:?}");
        Span::current().record("request_type", &request_type);

        let winding_down = !matches!(request, Request::Ping | Request::Status)
            && self.state.read().await.shutdown_requested();

        let response = match request {
            _ if winding_down => {
                debug!("Rejecting request during shutdown");
                Response::error(ErrorCode::ShuttingDown, "daemon is shutting down")
            }
            Request::Ping => Response::Pong,
            Request::Status => Response::status(self.status_info().await),
            Request::SaveJob { data } => {
                debug!(url = %data.url, "Handling SaveJob request");
                match self.engine.queue().enqueue(data.clone()).await {
                    Ok(item) => {
                        debug!(id = %item.id, "Queued, syncing now");
                        Response::action(self.run_pass().await.map_or_else(
                            |e| ActionResult::failed(e.to_string()),
                            |_| ActionResult::ok(),
                        ))
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected job");
                        Response::action(ActionResult::failed(e.to_string()))
                    }
                }
            }
            Request::GetAuthStatus => {
                let authenticated = self.engine.tokens().acquire(false).await.is_ok();
                debug!(authenticated, "Handling GetAuthStatus request");
                Response::auth_status(authenticated)
            }
            Request::RequestAuth => {
                info!("Handling RequestAuth request");
                match self.engine.tokens().acquire(true).await {
                    Ok(_) => Response::action(ActionResult::ok()),
                    Err(e) => Response::action(ActionResult::failed(e.to_string())),
                }
            }
            Request::GetQueueStatus => Response::queue_status(self.engine.queue().stats().await),
            Request::SyncQueue => {
                debug!("Handling SyncQueue request");
                Response::action(match self.run_pass().await {
                    Ok(_) => ActionResult::ok(),
                    Err(e) => ActionResult::failed(e.to_string()),
                })
            }
            Request::PauseSync => self.command_scheduler(true).await,
            Request::ResumeSync => self.command_scheduler(false).await,
            Request::Shutdown => {
                info!("Handling Shutdown request");
                self.state.write().await.request_shutdown();
                if let Some(ref handle) = self.shutdown {
                    handle.trigger();
                }
                Response::Ok
            }
        };

        let duration = start.elapsed();
        if tracing::enabled!(tracing::Level::DEBUG) {
            Span::current().record("duration_ms", duration.as_millis());
            debug!(
                request_type = %request_type,
                duration_ms = duration.as_millis(),
                "Request handled"
            );
        }

        response
    }

    async fn command_scheduler(&self, pause: bool) -> Response {
        let Some(ref scheduler) = self.scheduler else {
            return Response::error(ErrorCode::InternalError, "scheduler is not running");
        };

        let sent = if pause {
            scheduler.pause().await
        } else {
            scheduler.resume().await
        };
        match sent {
            Ok(()) => {
                info!(paused = pause, "Scheduled sync toggled");
                Response::Ok
            }
            Err(e) => {
                warn!(error = %e, "Scheduler is gone");
                Response::error(ErrorCode::InternalError, "scheduler has stopped")
            }
        }
    }

    async fn run_pass(&self) -> ServerResult<SyncSummary> {
        let result = self.engine.drain_pending().await;
        let recorded = result.as_ref().copied().map_err(|e| e.to_string());
        self.sync_state.write().await.record(&recorded);
        result
    }

    async fn status_info(&self) -> StatusInfo {
        let uptime = self.state.read().await.uptime_seconds();
        let queue = self.engine.queue().stats().await;
        let sync = self.sync_state.read().await.clone();

        let mut info = StatusInfo::new(uptime, queue).with_paused(sync.paused);
        if let Some(at) = sync.last_sync {
            info = info.with_last_sync(at);
        }
        if let Some(summary) = sync.last_summary {
            info = info.with_last_summary(summary);
        }
        if let Some(error) = sync.last_error {
            info = info.with_last_error(error);
        }
        info
    }

    /// Serves requests until the client disconnects.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        loop {
            match conn.read_request().await {
                Ok(Some(envelope)) => {
                    let response = self.handle(&envelope.payload).await;
                    conn.respond(&envelope.request_id, response).await?;

                    if self.state.read().await.shutdown_requested() {
                        return Err(ServerError::Shutdown);
                    }
                }
                Ok(None) => {
                    debug!("Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Error reading request");
                    return Err(e);
                }
            }
        }
    }
}

/// Creates a connection handler for [`SocketServer::run`](crate::SocketServer::run).
pub fn make_connection_handler(
    handler: Arc<RequestHandler>,
) -> impl Fn(Connection) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static
{
    move |conn| {
        let handler = handler.clone();
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await
                && !matches!(e, ServerError::Shutdown)
            {
                warn!(error = %e, "Connection handler error");
            }
        })
    }
}
