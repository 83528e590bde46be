use axum::{
    body::Body,
    http::{Response, StatusCode, header},
};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::UpstreamClient;
use crate::error::{ProxyError, Result};
use crate::metrics::ProxyMetrics;
use crate::streaming::{StreamRelay, read_capped};

/// Content type of relayed media segments
pub const STREAM_CONTENT_TYPE: &str = "video/mp2t";

/// Upstream response body as a boxed byte stream
pub type UpstreamStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// `upstream_host` without trailing slashes, joined to `path` without leading ones.
pub fn compose_target_url(upstream_host: &str, path: &str) -> String {
    format!(
        "{}/{}",
        upstream_host.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Forwards authorized requests to the single upstream and streams the answer back.
pub struct ForwardingEngine {
    client: UpstreamClient,
    upstream_host: String,
    metrics: Arc<ProxyMetrics>,
}

impl ForwardingEngine {
    pub fn new(client: UpstreamClient, upstream_host: String, metrics: Arc<ProxyMetrics>) -> Self {
        Self {
            client,
            upstream_host,
            metrics,
        }
    }

    pub fn upstream_host(&self) -> &str {
        &self.upstream_host
    }

    /// Fetch `path` from the upstream and build the client response.
    ///
    /// The returned future and the streaming body it produces are the request's
    /// lifetime: dropping either (the client went away) cancels the upstream
    /// read and releases its connection. Transport failures are not retried.
    pub async fn forward(&self, path: &str) -> Result<Response<Body>> {
        let request_id = Uuid::new_v4();
        let target = compose_target_url(&self.upstream_host, path);
        info!(request_id = %request_id, target = %target, "Forwarding");

        let upstream = match self.client.get(&target).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_upstream_error();
                warn!(request_id = %request_id, target = %target, error = %e, "Upstream request failed");
                return Err(e);
            }
        };

        let status = upstream.status();
        let body: UpstreamStream = Box::pin(upstream.bytes_stream());

        if !status.is_success() {
            self.metrics.record_upstream_status();
            let limit = self.client.policy().error_body_limit;
            let excerpt = read_capped(body, limit).await;
            warn!(
                request_id = %request_id,
                status = %status,
                relayed = excerpt.len(),
                "Upstream returned non-success status"
            );

            return Response::builder()
                .status(status)
                .body(Body::from(excerpt))
                .map_err(|e| ProxyError::Internal(e.to_string()));
        }

        let relay = StreamRelay::new(
            body,
            self.client.policy().transfer_buffer,
            request_id,
            Arc::clone(&self.metrics),
        );

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
            .body(Body::from_stream(relay))
            .map_err(|e| ProxyError::Internal(e.to_string()))
    }
}
