//! Signal handling for graceful shutdown
//!
//! Provides the shutdown token shared between the process signal handler
//! and the downloader. Triggering the token prevents new per-key downloads
//! from starting and lets in-flight ones observe cancellation at their next
//! chunk boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Cancellation handle observed by every in-flight download
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
    notify: broadcast::Sender<()>,
}

impl ShutdownToken {
    /// Create a fresh, untriggered token
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify,
        }
    }

    /// Trigger shutdown: set the flag and wake all subscribers
    pub fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.notify.send(());
    }

    /// Whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown notification
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs OS signal handlers that trigger a shutdown token
pub struct SignalHandler {
    token: ShutdownToken,
}

impl SignalHandler {
    /// Create a handler for the given token
    pub fn new(token: ShutdownToken) -> Self {
        Self { token }
    }

    /// Setup signal handling for graceful shutdown (CTRL-C, SIGTERM)
    ///
    /// Returns a handle to the background task that monitors for signals.
    /// When a signal is received, the token is triggered.
    pub fn setup(&self) -> JoinHandle<()> {
        let token = self.token.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install signal handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received Ctrl+C, initiating shutdown");
                },
                _ = terminate => {
                    info!("Received terminate signal, initiating shutdown");
                },
            }

            token.trigger();
        })
    }
}
