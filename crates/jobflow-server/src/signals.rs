//! Unix signal handling.
//!
//! - SIGTERM/SIGINT: graceful shutdown
//! - SIGHUP: drop the cached token and run a sync pass

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

/// Fans Unix signals out to watch channels.
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    /// Bumped on every reload so repeated SIGHUPs are not coalesced away.
    reload_tx: Arc<watch::Sender<u64>>,
    reload_rx: watch::Receiver<u64>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reload_tx, reload_rx) = watch::channel(0);

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            reload_tx: Arc::new(reload_tx),
            reload_rx,
        }
    }

    /// Spawns the signal listener task. Call once at startup.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_tx = self.shutdown_tx.clone();
        let reload_tx = self.reload_tx.clone();

        tokio::spawn(async move {
            let streams = (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
                signal(SignalKind::hangup()),
            );
            let (mut sigterm, mut sigint, mut sighup) = match streams {
                (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
                (term, int, hup) => {
                    let e = [term.err(), int.err(), hup.err()].into_iter().flatten().next();
                    error!(error = ?e, "Failed to install signal handlers");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating shutdown");
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, initiating shutdown");
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("Received SIGHUP, triggering reload");
                        reload_tx.send_modify(|n| *n += 1);
                    }
                }
            }

            debug!("Signal listener stopped");
        });
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, initiating shutdown");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    /// Completes when shutdown is signaled.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    /// A stream of reload requests.
    pub fn reloads(&self) -> ReloadSignal {
        let mut rx = self.reload_rx.clone();
        rx.mark_unchanged();
        ReloadSignal { rx }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn trigger_reload(&self) {
        self.reload_tx.send_modify(|n| *n += 1);
    }

    /// A handle other components can use to request shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// Completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // An error means the sender is gone, which is as good as a shutdown.
        let _ = self.rx.wait_for(|down| *down).await;
    }
}

/// Yields once per reload request.
pub struct ReloadSignal {
    rx: watch::Receiver<u64>,
}

impl ReloadSignal {
    /// Waits for the next reload. Returns false once the handler is gone.
    pub async fn next(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// A handle for triggering or checking shutdown status.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}
