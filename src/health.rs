use serde::Serialize;

use crate::cache::ReloadStats;
use crate::config::ListenSpec;
use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

/// Diagnostics served at `/health`. Lists usernames only, never passwords.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub users: Vec<String>,
    pub config_file: String,
    pub listen: ListenSpec,
    pub stream_host: String,
}

impl HealthReport {
    /// Read-only view of the current state; does not trigger a credential reload.
    pub fn collect(state: &AppState) -> Self {
        Self {
            ok: true,
            users: state.credentials.current().usernames(),
            config_file: state.config_file().display().to_string(),
            listen: state.listen.clone(),
            stream_host: state.engine.upstream_host().to_string(),
        }
    }
}

/// Counters served at `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub proxy: MetricsSnapshot,
    pub credentials: ReloadStats,
}

impl StatsReport {
    pub fn collect(state: &AppState) -> Self {
        Self {
            proxy: state.metrics.snapshot(),
            credentials: state.credentials.stats(),
        }
    }
}
