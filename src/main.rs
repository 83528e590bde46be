use anyhow::Context;
use clap::Parser;
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_gate::{
    AppState,
    cache::{CredentialCache, CredentialSnapshot, FileSource},
    client::UpstreamPolicy,
    config::{self, Overrides},
    handler::router,
};

/// Open streams get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Authenticating streaming reverse proxy
#[derive(Parser, Debug)]
#[command(name = "stream-gate", version, about)]
struct Args {
    /// Config file; created with defaults if missing
    #[arg(long, env = "STREAM_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Listen host, overrides the config file
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Listen port, overrides the config file
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Upstream base URL, overrides the config file
    #[arg(long, env = "STREAM_HOST")]
    stream_host: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            stream_host: self.stream_host.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    config::ensure_default(&args.config)
        .with_context(|| format!("init config {}", args.config.display()))?;
    let (mut config, modified) = config::load(&args.config)
        .with_context(|| format!("read config {}", args.config.display()))?;
    config.apply_overrides(&args.overrides());
    config.validate()?;

    let snapshot = CredentialSnapshot::new(config.users.clone(), Some(modified));
    let credentials = CredentialCache::new(FileSource::new(&args.config), snapshot);
    let state = Arc::new(AppState::new(&config, credentials, UpstreamPolicy::default())?);

    tracing::info!(
        listen = %config.listen.addr(),
        stream_host = %config.stream_host,
        users = config.users.len(),
        config_file = %state.config_file().display(),
        "Starting stream proxy"
    );

    let listener = TcpListener::bind(config.listen.addr())
        .await
        .with_context(|| format!("bind {}", config.listen.addr()))?;
    tracing::info!(address = %listener.local_addr()?, "Listening on /stream");

    let stopping = Arc::new(Notify::new());
    let server = axum::serve(listener, router(Arc::clone(&state))).with_graceful_shutdown({
        let stopping = Arc::clone(&stopping);
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!("Shutdown grace period elapsed, dropping open streams");
        }
    }

    tracing::info!(summary = %state.metrics.snapshot(), "Stream proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
