//! Pull-based content producer bridged to an async byte stream.
//!
//! A [`ContentReader`] is driven on tokio's blocking pool, one dedicated
//! flow per stream, and every non-empty chunk it produces is handed to the
//! HTTP body through a bounded channel. The reader is dropped on that flow
//! exactly once, whichever way the stream ends.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::error::TailResult;

/// 4 KiB response blocks.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

// Small on purpose: a slow client should stall the reader, not grow memory.
const CHANNEL_CAPACITY: usize = 4;

/// Something that fills a caller-supplied buffer on demand.
///
/// `Ok(0)` means "nothing right now, call again"; implementations must bound
/// how long a single call blocks. `Err` ends the stream with an error.
pub trait ContentReader: Send + 'static {
    fn read_chunk(&mut self, buf: &mut [u8]) -> TailResult<usize>;
}

pub struct ContentStream {
    inner: ReceiverStream<TailResult<Bytes>>,
}

impl ContentStream {
    /// Start driving `reader` with `block_size` byte pulls until the consumer
    /// goes away, the reader fails, or `shutdown` turns true.
    pub fn spawn<R: ContentReader>(
        reader: R,
        block_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || drive(reader, block_size, tx, shutdown));
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for ContentStream {
    type Item = TailResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

fn drive<R: ContentReader>(
    mut reader: R,
    block_size: usize,
    tx: mpsc::Sender<TailResult<Bytes>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let handle = Handle::current();
    let mut buf = vec![0u8; block_size];
    let mut sent: u64 = 0;

    loop {
        // Checked before every pull so an idle stream notices a disconnect
        // within one poll interval.
        if tx.is_closed() {
            debug!(bytes = sent, "Consumer closed, stopping reader");
            break;
        }
        if *shutdown.borrow() {
            debug!(bytes = sent, "Shutdown requested, ending stream");
            break;
        }

        match reader.read_chunk(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if !forward(&handle, &tx, &mut shutdown, Ok(chunk)) {
                    debug!(bytes = sent, "Stream ended mid-send, stopping reader");
                    break;
                }
                sent += n as u64;
            }
            Err(e) => {
                warn!(error = %e, bytes = sent, "Content reader failed, aborting stream");
                forward(&handle, &tx, &mut shutdown, Err(e));
                break;
            }
        }
    }

    drop(reader);
}

/// Queue `item` for the consumer. A consumer that stops reading without
/// disconnecting must not hold the reader past shutdown, so the wait for a
/// free slot also ends when shutdown is requested. Returns false if the
/// item was not delivered.
fn forward(
    handle: &Handle,
    tx: &mpsc::Sender<TailResult<Bytes>>,
    shutdown: &mut watch::Receiver<bool>,
    item: TailResult<Bytes>,
) -> bool {
    handle.block_on(async {
        tokio::select! {
            res = tx.send(item) => res.is_ok(),
            _ = shutdown_requested(shutdown) => false,
        }
    })
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender can never request shutdown.
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
