//! Periodic and on-demand sync passes.
//!
//! The scheduler ticks on a fixed period and spawns one pass per tick, so a
//! slow pass never shifts the schedule. Failures are not backed off: the
//! next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use jobflow_protocol::SyncSummary;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between passes.
    pub sync_interval: Duration,
    /// Whether to run a pass as soon as the scheduler starts.
    pub sync_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            sync_on_start: true,
        }
    }
}

impl SchedulerConfig {
    pub fn new(sync_interval: Duration) -> Self {
        Self {
            sync_interval,
            ..Default::default()
        }
    }

    pub fn with_sync_on_start(mut self, enabled: bool) -> Self {
        self.sync_on_start = enabled;
        self
    }
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a pass now, even while paused.
    SyncNow,
    /// Skip periodic passes until resumed.
    Pause,
    Resume,
    Stop,
}

/// What the last passes did.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub paused: bool,
    /// End of the last pass that completed without error.
    pub last_sync: Option<DateTime<Utc>>,
    /// End of the last pass, successful or not.
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_summary: Option<SyncSummary>,
    pub last_error: Option<String>,
    pub passes: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, summary: SyncSummary) {
        let now = Utc::now();
        self.passes += 1;
        self.last_sync = Some(now);
        self.last_attempt = Some(now);
        self.last_summary = Some(summary);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.passes += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    pub fn record(&mut self, result: &Result<SyncSummary, String>) {
        match result {
            Ok(summary) => self.record_success(*summary),
            Err(e) => self.record_failure(e.clone()),
        }
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

pub fn new_scheduler_state() -> SharedSchedulerState {
    Arc::new(RwLock::new(SchedulerState::new()))
}

/// Drives sync passes on a timer and on request.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_state(config, new_scheduler_state())
    }

    /// Creates a scheduler that records into an existing state.
    pub fn with_state(config: SchedulerConfig, state: SharedSchedulerState) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state,
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs until stopped, calling `sync_fn` for every pass.
    ///
    /// Each pass is spawned onto the runtime; the pass itself is expected to
    /// serialize with other passes.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncSummary, String>> + Send + 'static,
    {
        let Self {
            config,
            state,
            command_rx: mut commands,
            ..
        } = self;

        info!(
            interval_secs = config.sync_interval.as_secs(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !config.sync_on_start {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if state.read().await.paused {
                        debug!("Scheduler paused, skipping sync");
                        continue;
                    }
                    spawn_pass(&state, sync_fn());
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow) => {
                            debug!("Received SyncNow command");
                            spawn_pass(&state, sync_fn());
                        }
                        Some(SchedulerCommand::Pause) => {
                            info!("Scheduler paused");
                            state.write().await.paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            info!("Scheduler resumed");
                            state.write().await.paused = false;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn spawn_pass<Fut>(state: &SharedSchedulerState, pass: Fut)
where
    Fut: Future<Output = Result<SyncSummary, String>> + Send + 'static,
{
    let state = state.clone();
    tokio::spawn(async move {
        let result = pass.await;
        if let Err(ref e) = result {
            warn!(error = %e, "Scheduled sync failed");
        }
        state.write().await.record(&result);
    });
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    pub async fn sync_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::SyncNow).await
    }

    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}
