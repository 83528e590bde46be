use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::CredentialCache;
use crate::client::{UpstreamClient, UpstreamPolicy};
use crate::config::{Config, ListenSpec, absolute_path};
use crate::error::Result;
use crate::metrics::ProxyMetrics;
use crate::proxy::ForwardingEngine;

/// Everything the handlers share.
///
/// Built once at startup from the resolved config; only the credential
/// snapshot inside `credentials` changes afterwards.
pub struct AppState {
    pub credentials: Arc<CredentialCache>,
    pub engine: ForwardingEngine,
    pub listen: ListenSpec,
    pub config_file: PathBuf,
    pub metrics: Arc<ProxyMetrics>,
}

impl AppState {
    pub fn new(config: &Config, credentials: CredentialCache, policy: UpstreamPolicy) -> Result<Self> {
        let metrics = Arc::new(ProxyMetrics::new());
        let client = UpstreamClient::new(policy)?;
        let engine = ForwardingEngine::new(client, config.stream_host.clone(), Arc::clone(&metrics));
        let config_file = absolute_path(credentials.path());

        Ok(Self {
            credentials: Arc::new(credentials),
            engine,
            listen: config.listen.clone(),
            config_file,
            metrics,
        })
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }
}
