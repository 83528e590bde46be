//! # Stream Gate
//!
//! An authenticating streaming reverse proxy for live media segments.
//!
//! ## Overview
//!
//! Every `GET /stream?user=&pass=&path=` request is checked against a credential
//! mapping kept in a JSON config file, then forwarded to a single fixed upstream
//! host. The upstream body is relayed back in bounded chunks without buffering
//! the whole response.
//!
//! The config file can be edited while the proxy runs: the credential cache
//! notices a newer modification time on the next request and swaps in a fresh
//! snapshot. A broken edit is logged and the previous credentials stay active.
//!
//! ## Modules
//!
//! - [`config`] - Config file schema, defaults and startup overrides
//! - [`cache`] - Hot-reloading credential snapshot
//! - [`validation`] - Request parameter and credential checks
//! - [`client`] - Pooled upstream HTTP client
//! - [`proxy`] - Forwarding engine
//! - [`streaming`] - Bounded body relay and capped error bodies
//! - [`health`] - `/health` and `/stats` reports
//! - [`handler`] - axum routes

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod state;
pub mod streaming;
pub mod validation;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use state::AppState;
