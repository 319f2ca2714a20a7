use crate::config::SlowlogdConfig;
use crate::metrics::StreamMetrics;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared application state (thread-safe)
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SlowlogdConfig>,
    pub metrics: StreamMetrics,
    /// Flipped to `true` once on shutdown. Streams opened after the flip
    /// still see it, since a watch keeps its latest value.
    pub shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: SlowlogdConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: Arc::new(config),
            metrics: StreamMetrics::new(),
            shutdown_tx,
        }
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown to all open streams
    pub fn shutdown(&self) {
        // Stored even with no receivers, unlike `send`.
        self.shutdown_tx.send_replace(true);
    }
}
