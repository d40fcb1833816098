//! Graceful shutdown handling.
//!
//! SIGINT or SIGTERM is broadcast to every subscriber; the HTTP server stops
//! accepting connections and lets in-flight requests finish.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Handle for managing graceful shutdown.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a receiver for shutdown signals.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown for every subscriber.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "No subscribers for shutdown signal");
        }
    }

    /// Spawn a task that triggers shutdown on SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) {
        let handle = self.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C signal"),
                _ = terminate => info!("Received SIGTERM signal"),
            }

            handle.shutdown();
        });
    }

    /// Future that resolves once shutdown has been triggered.
    ///
    /// Subscribes immediately so a trigger after this call is never missed.
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            match rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Shutdown channel closed");
                }
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let shutdown = GracefulShutdown::new();
        let first = shutdown.signalled();
        let second = shutdown.signalled();

        shutdown.shutdown();

        timeout(Duration::from_secs(1), first).await.unwrap();
        timeout(Duration::from_secs(1), second).await.unwrap();
    }

    #[tokio::test]
    async fn signalled_waits_until_triggered() {
        let shutdown = GracefulShutdown::new();
        let pending = shutdown.signalled();
        assert!(timeout(Duration::from_millis(50), pending).await.is_err());
    }

    #[test]
    fn shutdown_without_subscribers_is_harmless() {
        GracefulShutdown::default().shutdown();
    }
}
