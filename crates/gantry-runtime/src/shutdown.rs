//! Graceful shutdown with signal handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

/// Shutdown signal broadcaster
///
/// Clones share the same signal. Subscribers created after the trigger
/// should check [`ShutdownSignal::is_triggered`] first.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown; later calls are no-ops
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(());
        tracing::info!("Shutdown signal triggered");
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown is triggered
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal handler for OS signals
#[derive(Debug)]
pub struct SignalHandler {
    signal: ShutdownSignal,
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new(signal: ShutdownSignal) -> Self {
        Self { signal }
    }

    /// Wait for SIGINT/SIGTERM (Ctrl+C elsewhere) and trigger shutdown
    pub async fn run(self) {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                        _ = sigint.recv() => tracing::info!("Received SIGINT"),
                    }
                    self.signal.trigger();
                    return;
                }
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!(error = %err, "Failed to install signal handlers, using Ctrl+C");
                }
            }
        }

        match signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C");
                self.signal.trigger();
            }
            Err(err) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    }
}
