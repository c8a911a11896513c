//! Daemon: durable queue, sync engine, scheduler, notifications.
//!
//! This crate provides the jobflow server daemon that handles:
//! - Unix socket IPC for client communication
//! - A file-backed queue of captured jobs
//! - Sync passes that append pending jobs to the tracker sheet
//! - Desktop notifications when a job is saved or given up on
//!
//! # Example
//!
//! ```rust,no_run
//! use jobflow_server::{DurableQueue, JsonFileStore};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = DurableQueue::open(Box::new(JsonFileStore::new("queue.json")), 50)?;
//! println!("{:?}", queue.stats().await);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod notify;
mod pidfile;
mod queue;
mod scheduler;
mod signals;
mod socket;
mod sync;

pub use config::{ServerConfig, default_socket_path};
pub use error::{ServerError, ServerResult};
pub use handler::{
    RequestHandler, ServerState, SharedState, make_connection_handler, new_shared_state,
};
pub use notify::{DesktopNotifier, Notice, Notifier, NotifyConfig, RecordingNotifier};
pub use pidfile::{PidFile, default_pid_path};
pub use queue::{
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_SYNCED, DurableQueue, JsonFileStore, MemoryStore, QueueItem,
    QueueStatus, QueueStore, queue_stats, retain_recent_synced,
};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState, new_scheduler_state,
};
pub use signals::{ReloadSignal, ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, SocketServer};
pub use sync::{SyncConfig, SyncEngine};
