//! Health check endpoint
//!
//! Reports whether the document store answers reads, so a load balancer
//! can pull an instance whose database file went away.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub store: &'static str,
    /// Seasons visible to the aggregator; absent when the store is unreachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasons: Option<usize>,
}

/// GET /health
///
/// Does NOT require authentication. Answers 503 when listing seasons fails.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store, seasons) = match state.store.list("seasons").await {
        Ok(seasons) => (StatusCode::OK, "ok", "reachable", Some(seasons.len())),
        Err(e) => {
            warn!("Health check could not read the store: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable", None)
        }
    };

    let response = HealthResponse {
        status,
        module: "courtstats-agg",
        version: env!("CARGO_PKG_VERSION"),
        build: env!("GIT_HASH"),
        store,
        seasons,
    };
    (code, Json(response))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
