use axum::{
    Json, Router,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ProxyError;
use crate::health::{HealthReport, StatsReport};
use crate::state::AppState;
use crate::validation::{StreamParams, validate};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", get(handle_stream))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .with_state(state)
}

pub async fn handle_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Response {
    state.metrics.record_request();

    let authorized = match validate(&params, &state.credentials) {
        Ok(authorized) => authorized,
        Err(e) => {
            match e {
                ProxyError::BadRequest => state.metrics.record_bad_request(),
                ProxyError::Forbidden => state.metrics.record_forbidden(),
                _ => {}
            }
            return e.into_response();
        }
    };

    debug!(user = %authorized.user, path = %authorized.path, "Request authorized");

    match state.engine.forward(&authorized.path).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

pub async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport::collect(&state))
}

pub async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(StatsReport::collect(&state))
}
