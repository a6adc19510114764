//! Reconciliation and cache rebuild triggers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::reconcile::{ReconcileSummary, SeasonOutcome};
use crate::AppState;

/// POST /api/seasons/:season_id/reconcile
pub async fn reconcile_season(
    State(state): State<AppState>,
    Path(season_id): Path<String>,
) -> ApiResult<Json<ReconcileSummary>> {
    let summary = state.reconciler.reconcile_season(&season_id).await?;
    Ok(Json(summary))
}

/// POST /api/reconcile
pub async fn reconcile_active(State(state): State<AppState>) -> ApiResult<Json<Vec<SeasonOutcome>>> {
    let outcomes = state.reconciler.reconcile_active().await?;
    Ok(Json(outcomes))
}

/// POST /api/seasons/:season_id/cache/rebuild
///
/// Always 202; `queued` is false when rebuilds are disabled or the queue is full.
pub async fn request_cache_rebuild(
    State(state): State<AppState>,
    Path(season_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let queued = state.rebuild.request(&season_id);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "seasonId": season_id, "queued": queued })),
    )
}
