use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Slow-log stream metrics tracker
#[derive(Clone)]
pub struct StreamMetrics {
    inner: Arc<StreamMetricsInner>,
}

struct StreamMetricsInner {
    /// Streams currently attached to a client
    active_streams: AtomicU64,

    /// Streams opened (lifetime)
    streams_opened: AtomicU64,

    /// Requests that failed to open the slow log
    open_failures: AtomicU64,

    /// Bytes handed to response bodies
    bytes_sent: AtomicU64,
}

/// Held by a response body for as long as its stream lives.
pub struct StreamGuard {
    metrics: StreamMetrics,
    bytes: u64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StreamMetricsInner {
                active_streams: AtomicU64::new(0),
                streams_opened: AtomicU64::new(0),
                open_failures: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
            }),
        }
    }

    /// Called once a stream is attached to a response
    pub fn stream_started(&self) -> StreamGuard {
        self.inner.active_streams.fetch_add(1, Ordering::Relaxed);
        self.inner.streams_opened.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(active = self.active_count(), "Stream started");

        StreamGuard {
            metrics: self.clone(),
            bytes: 0,
        }
    }

    fn stream_ended(&self, bytes: u64) {
        let _ = self.inner.active_streams.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| current.checked_sub(1),
        );

        tracing::debug!(active = self.active_count(), bytes, "Stream ended");
    }

    pub fn open_failed(&self) {
        self.inner.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active_streams.load(Ordering::Relaxed)
    }

    pub fn total_opened(&self) -> u64 {
        self.inner.streams_opened.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.inner.open_failures.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            active_streams = self.active_count(),
            total_opened = self.total_opened(),
            open_failures = self.failed_count(),
            total_bytes = self.total_bytes(),
            "Stream metrics summary"
        );
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamGuard {
    pub fn record_bytes(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.metrics
            .inner
            .bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.metrics.stream_ended(self.bytes);
    }
}
