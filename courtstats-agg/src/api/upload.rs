//! Boxscore upload endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::upload::{UploadOutcome, UploadRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    #[serde(default)]
    pub csv: String,
    #[serde(default)]
    pub intervals_csv: Option<String>,
}

/// POST /api/seasons/:season_id/games/:game_id/boxscores/:team_id
pub async fn upload_boxscore(
    State(state): State<AppState>,
    Path((season_id, game_id, team_id)): Path<(String, String, String)>,
    Json(body): Json<UploadBody>,
) -> ApiResult<Json<UploadOutcome>> {
    let outcome = state
        .aggregator
        .upload(UploadRequest {
            season_id,
            game_id,
            team_id,
            csv: body.csv,
            intervals_csv: body.intervals_csv,
        })
        .await?;
    Ok(Json(outcome))
}
