//! Shared fixtures: an in-process upstream double and a proxy bound to a random port.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{StatusCode, Uri},
    response::Response,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;

use stream_gate::{
    AppState,
    cache::{CredentialCache, FileSource},
    client::UpstreamPolicy,
    config,
    handler::router,
};

pub const SEGMENT_LEN: usize = 200_000;
pub const ERROR_BODY_LEN: usize = 10_000;

/// Upstream double that records every path it is asked for.
///
/// - `/ok/...` answers 200 with `SEGMENT_LEN` bytes
/// - `/missing/...` answers 404 with `ERROR_BODY_LEN` bytes
/// - `/live/...` answers 200 with a body that never ends
pub struct Upstream {
    pub base: String,
    hits: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl Upstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

pub async fn spawn_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new().fallback({
        let hits = Arc::clone(&hits);
        let paths = Arc::clone(&paths);
        move |uri: Uri| {
            let hits = Arc::clone(&hits);
            let paths = Arc::clone(&paths);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                paths.lock().unwrap().push(uri.path().to_string());
                upstream_response(uri.path())
            }
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream { base, hits, paths }
}

fn upstream_response(path: &str) -> Response {
    if path.starts_with("/missing/") {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from(vec![b'e'; ERROR_BODY_LEN]))
            .unwrap();
    }

    if path.starts_with("/live/") {
        let endless = futures::stream::unfold(0u64, |n| async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Some((Ok::<_, std::io::Error>(Bytes::from(vec![0x47u8; 188 * 10])), n + 1))
        });
        return Response::builder()
            .status(StatusCode::OK)
            .body(Body::from_stream(endless))
            .unwrap();
    }

    if path.starts_with("/ok/") {
        return Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(vec![0x47u8; SEGMENT_LEN]))
            .unwrap();
    }

    Response::builder()
        .status(StatusCode::IM_A_TEAPOT)
        .body(Body::empty())
        .unwrap()
}

/// A base URL nothing listens on
pub async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub struct Proxy {
    pub base: String,
    pub state: Arc<AppState>,
    pub config_path: PathBuf,
}

impl Proxy {
    pub fn stream_url(&self, user: &str, pass: &str, path: &str) -> String {
        format!(
            "{}/stream?user={}&pass={}&path={}",
            self.base, user, pass, path
        )
    }
}

pub fn scratch_config_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("stream-gate-it-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

/// Write a config document and push its mtime to `stamp_secs` past the epoch so
/// consecutive writes always differ.
pub fn write_config(path: &Path, body: &str, stamp_secs: u64) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(stamp_secs))
        .unwrap();
}

pub fn config_json(stream_host: &str, users: &[(&str, &str)]) -> String {
    let users: serde_json::Map<String, serde_json::Value> = users
        .iter()
        .map(|(u, p)| (u.to_string(), serde_json::Value::String(p.to_string())))
        .collect();
    serde_json::json!({
        "listen": {"host": "127.0.0.1", "port": 8000},
        "stream_host": stream_host,
        "users": users,
    })
    .to_string()
}

pub async fn spawn_proxy(stream_host: &str) -> Proxy {
    let config_path = scratch_config_path();
    write_config(
        &config_path,
        &config_json(stream_host, &[("alice", "wonderland")]),
        1_000_000,
    );

    let (config, _) = config::load(&config_path).unwrap();
    let credentials = CredentialCache::open(FileSource::new(&config_path)).unwrap();
    let state = Arc::new(AppState::new(&config, credentials, UpstreamPolicy::default()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Proxy {
        base,
        state,
        config_path,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
