use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::debug;

/// Collect at most `limit` bytes from `body`, then stop reading.
///
/// A read error ends collection early; whatever arrived before it is returned.
pub async fn read_capped<S, E>(mut body: S, limit: usize) -> Bytes
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut buf = BytesMut::with_capacity(limit.min(8 * 1024));

    while buf.len() < limit {
        match body.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Some(Err(e)) => {
                debug!(error = %e, collected = buf.len(), "Error body read ended early");
                break;
            }
            None => break,
        }
    }

    buf.freeze()
}
