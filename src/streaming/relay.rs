use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::ProxyMetrics;

/// Passthrough body that re-chunks upstream bytes into at most `chunk_size`
/// pieces and accounts for how the relay ended.
///
/// The client disconnecting shows up as this stream being dropped before the
/// upstream finished. That is the normal way a live stream ends and is only
/// logged at debug level. An upstream read error ends the relay and is logged.
pub struct StreamRelay<S> {
    upstream: S,
    pending: Bytes,
    chunk_size: usize,
    relayed: u64,
    finished: bool,
    request_id: Uuid,
    metrics: Arc<ProxyMetrics>,
}

impl<S> StreamRelay<S> {
    pub fn new(
        upstream: S,
        chunk_size: usize,
        request_id: Uuid,
        metrics: Arc<ProxyMetrics>,
    ) -> Self {
        Self {
            upstream,
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            relayed: 0,
            finished: false,
            request_id,
            metrics,
        }
    }

    pub fn relayed(&self) -> u64 {
        self.relayed
    }
}

impl<S, E> Stream for StreamRelay<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(this.chunk_size);
                let chunk = this.pending.split_to(n);
                this.relayed += n as u64;
                this.metrics.record_bytes(n);
                return Poll::Ready(Some(Ok(chunk)));
            }

            match ready!(this.upstream.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(e)) => {
                    this.finished = true;
                    this.metrics.record_copy_error();
                    warn!(
                        request_id = %this.request_id,
                        relayed = this.relayed,
                        error = %e,
                        "Stream copy error"
                    );
                    return Poll::Ready(Some(Err(std::io::Error::other(e))));
                }
                None => {
                    this.finished = true;
                    this.metrics.record_completed();
                    debug!(
                        request_id = %this.request_id,
                        relayed = this.relayed,
                        "Stream completed"
                    );
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<S> Drop for StreamRelay<S> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.record_cancelled();
            debug!(
                request_id = %self.request_id,
                relayed = self.relayed,
                "Client disconnected, upstream released"
            );
        }
    }
}
