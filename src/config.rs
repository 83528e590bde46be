use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 8000;
pub const DEFAULT_STREAM_HOST: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl Default for ListenSpec {
    fn default() -> Self {
        Self {
            host: DEFAULT_LISTEN_HOST.to_string(),
            port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl ListenSpec {
    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Logical view of the persisted configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub listen: ListenSpec,
    pub stream_host: String,
    pub users: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut users = BTreeMap::new();
        users.insert("test".to_string(), "123456".to_string());

        Self {
            listen: ListenSpec::default(),
            stream_host: DEFAULT_STREAM_HOST.to_string(),
            users,
        }
    }
}

/// On-disk shape before defaults and coercion are applied.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    listen: Option<ListenSpec>,
    #[serde(default)]
    stream_host: Option<String>,
    #[serde(default)]
    users: Option<BTreeMap<String, Value>>,
}

/// Startup-only values that take precedence over the file. Not hot-reloaded.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub stream_host: Option<String>,
}

impl Config {
    /// Parse a config document, filling defaults and coercing credentials to strings.
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents)?;

        let mut listen = raw.listen.unwrap_or_default();
        if listen.host.is_empty() {
            listen.host = DEFAULT_LISTEN_HOST.to_string();
        }
        if listen.port == 0 {
            listen.port = DEFAULT_LISTEN_PORT;
        }

        let users = raw
            .users
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name, coerce_to_string(value)))
            .collect();

        Ok(Config {
            listen,
            stream_host: raw.stream_host.unwrap_or_default(),
            users,
        })
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.host.as_deref().filter(|h| !h.is_empty()) {
            self.listen.host = host.to_string();
        }
        if let Some(port) = overrides.port.filter(|p| *p != 0) {
            self.listen.port = port;
        }
        if let Some(stream_host) = overrides.stream_host.as_deref().filter(|h| !h.is_empty()) {
            self.stream_host = stream_host.to_string();
        }
    }

    /// Validate the values the server binds and forwards with
    pub fn validate(&self) -> Result<()> {
        if self.listen.port == 0 {
            return Err(ProxyError::InvalidConfig(
                "Listen port must be in 1..=65535".to_string(),
            ));
        }

        if self.stream_host.is_empty() {
            return Err(ProxyError::InvalidConfig(
                "stream_host is empty".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.stream_host).map_err(|e| {
            ProxyError::InvalidConfig(format!(
                "stream_host {:?} is not a valid URL: {}",
                self.stream_host, e
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(ProxyError::InvalidConfig(format!(
                "stream_host {:?} must be an http(s) URL with a host",
                self.stream_host
            )));
        }

        Ok(())
    }
}

fn coerce_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Write the default config to `path` if nothing exists there yet.
///
/// Missing parent directories are created. Returns `true` when a file was written.
pub fn ensure_default(path: &Path) -> Result<bool> {
    if path.try_exists()? {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut contents = serde_json::to_string_pretty(&Config::default())?;
    contents.push('\n');
    fs::write(path, contents)?;

    tracing::info!(path = %path.display(), "Created default config file");
    Ok(true)
}

/// Read and parse the config at `path`, returning it with the file's modification time.
pub fn load(path: &Path) -> Result<(Config, SystemTime)> {
    // Stat before reading: a write landing in between leaves an older stamp on
    // newer content, which only costs one extra reload.
    let modified = fs::metadata(path)?.modified()?;
    let contents = fs::read_to_string(path)?;
    let config = Config::from_json(&contents)?;
    Ok((config, modified))
}

/// Absolute form of `path` for diagnostics; falls back to the path as given.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
