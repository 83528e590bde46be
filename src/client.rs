use reqwest::{Client, Response, header};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProxyError, Result};

/// Connection and pool parameters for the upstream client.
///
/// No overall request timeout is applied: a relayed stream runs for as long as
/// both ends keep it open.
#[derive(Debug, Clone)]
pub struct UpstreamPolicy {
    /// TCP connect, TLS handshake included
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
    /// Time allowed from issuing the request until response headers arrive.
    /// Runs concurrently with `connect_timeout` when a new connection is dialed.
    pub response_header_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Size of each chunk handed to the client while streaming
    pub transfer_buffer: usize,
    /// Body bytes relayed for a non-2xx upstream response
    pub error_body_limit: usize,
}

impl Default for UpstreamPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Duration::from_secs(60),
            response_header_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 256,
            transfer_buffer: 64 * 1024,
            error_body_limit: 4096,
        }
    }
}

/// Pooled HTTP client for the single upstream host.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    policy: UpstreamPolicy,
}

impl UpstreamClient {
    pub fn new(policy: UpstreamPolicy) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(policy.connect_timeout)
            .tcp_keepalive(policy.tcp_keepalive)
            .pool_idle_timeout(policy.pool_idle_timeout)
            .pool_max_idle_per_host(policy.pool_max_idle_per_host)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &UpstreamPolicy {
        &self.policy
    }

    /// Issue a single GET to `url` and wait for its response headers.
    ///
    /// Never retries. Dropping the returned future aborts the request and
    /// releases the connection.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            .header(header::CONNECTION, "keep-alive")
            .send();

        let response = tokio::time::timeout(self.policy.response_header_timeout, request)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.policy.response_header_timeout))?
            .map_err(|e| ProxyError::UpstreamConnect(e.to_string()))?;

        debug!(status = %response.status(), version = ?response.version(), "Upstream responded");
        Ok(response)
    }
}
