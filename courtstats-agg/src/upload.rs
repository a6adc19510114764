//! Boxscore upload: the incremental aggregation path
//!
//! One upload replaces one team's boxscore for one game. Only the
//! difference against what was stored before is applied to the aggregates,
//! so a corrected CSV can be re-uploaded without any manual cleanup.

use crate::delta::{
    compute_player_deltas, jersey_number, player_increments, result_transition,
    scores_after_upload, team_increments, team_points, PlayerDelta,
};
use crate::rebuild::RebuildHandle;
use chrono::Utc;
use courtstats_common::config::AggregationConfig;
use courtstats_common::fields::{ASSISTS, DEFAULT_PHASE, POINTS, TOTAL_REBOUNDS};
use courtstats_common::intervals::{parse_intervals, IntervalSummary};
use courtstats_common::models::{
    BoxscoreRow, Game, GameStatus, PlayerGameRef, RecentResult, Side,
};
use courtstats_common::normalize::{parse_and_normalise, RowError};
use courtstats_common::paths::collections;
use courtstats_common::store::recent::upsert_recent_result;
use courtstats_common::store::{
    from_document, to_document, BatchWriter, Document, DocumentStore, WriteOp,
};
use courtstats_common::{DocPath, Error, StatLine};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// One team's boxscore for one game
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub season_id: String,
    pub game_id: String,
    pub team_id: String,
    pub csv: String,
    /// Optional period/interval scoring CSV
    pub intervals_csv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub success: bool,
    pub home_score: i64,
    pub away_score: i64,
    pub team_id: String,
    pub affected_players: Vec<String>,
    pub affected_teams: Vec<String>,
    pub removed_players: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<RowError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_headers: Vec<String>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing usable in the CSV; the row diagnostics go back to the operator
    #[error("CSV contains no data rows")]
    NoDataRows { parse_errors: Vec<RowError> },

    #[error(transparent)]
    Common(#[from] Error),
}

impl From<UploadError> for crate::error::ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NoDataRows { parse_errors } => {
                crate::error::ApiError::NoDataRows { parse_errors }
            }
            UploadError::Common(e) => crate::error::ApiError::Common(e),
        }
    }
}

/// Applies boxscore uploads to the season aggregates
pub struct DeltaAggregator {
    store: Arc<dyn DocumentStore>,
    settings: AggregationConfig,
    rebuild: RebuildHandle,
}

impl DeltaAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, settings: AggregationConfig, rebuild: RebuildHandle) -> Self {
        Self {
            store,
            settings,
            rebuild,
        }
    }

    /// Store one team's boxscore and fold the change into every aggregate.
    ///
    /// **Algorithm:**
    /// 1. Validate the request against the game header (nothing written on failure)
    /// 2. Load this team's previously stored boxscore rows
    /// 3. Compute per-player deltas, the team's points and the result transition
    /// 4. Queue writes in bounded batches: boxscores, player aggregates,
    ///    team aggregates, game header, player game-log references
    /// 5. Commit all batches
    /// 6. Upsert both teams' recent results (failure logged, not returned)
    /// 7. Store the interval summary if one was supplied (best-effort)
    /// 8. Queue a cache rebuild for the season
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let UploadRequest {
            season_id,
            game_id,
            team_id,
            csv,
            intervals_csv,
        } = request;

        for (name, value) in [("seasonId", &season_id), ("gameId", &game_id), ("teamId", &team_id)] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{} is required", name)).into());
            }
            if value.contains('/') {
                return Err(Error::InvalidInput(format!("{} must not contain '/'", name)).into());
            }
        }
        if csv.trim().is_empty() {
            return Err(Error::InvalidInput("csv is empty".into()).into());
        }

        let game_path = DocPath::game(&season_id, &game_id);
        let game: Game = match self.store.get(&game_path).await? {
            Some(doc) => from_document(doc)?,
            None => {
                return Err(Error::NotFound(format!("game {} in season {}", game_id, season_id)).into())
            }
        };
        if game.home_team_id.is_empty() || game.away_team_id.is_empty() {
            return Err(Error::InvalidInput(format!("game {} is missing a team id", game_id)).into());
        }
        let side = game.side_of(&team_id).ok_or_else(|| {
            Error::InvalidInput(format!("team {} did not play in game {}", team_id, game_id))
        })?;

        let parsed = parse_and_normalise(&csv);
        if parsed.rows.iter().all(|row| row.player_name().is_empty()) {
            return Err(UploadError::NoDataRows {
                parse_errors: parsed.errors,
            });
        }

        let existing = self.load_team_boxscores(&season_id, &game_id, &team_id).await?;
        let deltas = compute_player_deltas(&team_id, &parsed.rows, &existing);
        let new_scores = scores_after_upload(&game, side, team_points(&deltas));
        let transition = result_transition(&game, side, new_scores);
        let phase = if game.phase.trim().is_empty() {
            DEFAULT_PHASE
        } else {
            game.phase.as_str()
        };
        let now = Utc::now().to_rfc3339();

        let limit = self.settings.batch_limit.min(self.store.batch_limit());
        let mut writer = BatchWriter::new(limit);
        let mut team_stats = StatLine::zeroed();
        let mut affected_players = Vec::new();
        let mut removed_players = Vec::new();

        for delta in &deltas {
            team_stats.add(&delta.stats);
            match &delta.row {
                Some(_) => {
                    queue_player_upsert(&mut writer, &season_id, &game_id, &team_id, &game, delta, phase, &now)?;
                    affected_players.push(delta.player_id.clone());
                }
                None => {
                    queue_player_removal(&mut writer, &season_id, &game_id, delta, phase);
                    removed_players.push(delta.player_id.clone());
                }
            }
        }

        let mut affected_teams = vec![team_id.clone()];
        let team_incs = team_increments(&transition.uploading, &team_stats, phase);
        if !team_incs.is_empty() {
            writer.update(
                DocPath::team_aggregate(&season_id, &team_id),
                team_identity(&season_id, &team_id),
                team_incs,
            );
        }

        let opponent_id = game.team_id(side.opposite()).to_string();
        if !transition.opponent.is_zero() {
            writer.update(
                DocPath::team_aggregate(&season_id, &opponent_id),
                team_identity(&season_id, &opponent_id),
                team_increments(&transition.opponent, &StatLine::zeroed(), phase),
            );
            affected_teams.push(opponent_id.clone());
        }

        let score_field = match side {
            Side::Home => "homeScore",
            Side::Away => "awayScore",
        };
        writer.merge(
            game_path,
            object(json!({
                "status": GameStatus::Finished,
                "processedAggregates": true,
                score_field: new_scores.of(side),
                "updatedAt": now,
            })),
        );

        let ops = writer.commit_all(self.store.as_ref()).await?;

        for s in [side, side.opposite()] {
            let entry = RecentResult::from_game(&game_id, &game, new_scores, s);
            let path = DocPath::team_aggregate(&season_id, game.team_id(s));
            if let Err(e) = upsert_recent_result(
                self.store.as_ref(),
                &path,
                &entry,
                self.settings.max_recent_results,
                self.settings.transaction_max_wait_ms,
            )
            .await
            {
                error!(
                    season_id = %season_id,
                    game_id = %game_id,
                    team_id = %game.team_id(s),
                    error = %e,
                    "Recent results update failed; aggregates are committed"
                );
            }
        }

        if let Some(intervals) = intervals_csv.as_deref().filter(|c| !c.trim().is_empty()) {
            self.store_intervals(&season_id, &game_id, intervals).await;
        }

        self.rebuild.request(&season_id);

        info!(
            season_id = %season_id,
            game_id = %game_id,
            team_id = %team_id,
            players = affected_players.len(),
            removed = removed_players.len(),
            home_score = new_scores.home,
            away_score = new_scores.away,
            ops,
            "Boxscore upload applied"
        );

        Ok(UploadOutcome {
            success: true,
            home_score: new_scores.home,
            away_score: new_scores.away,
            team_id,
            affected_players,
            affected_teams,
            removed_players,
            parse_errors: parsed.errors,
            unknown_headers: parsed.unknown_headers,
        })
    }

    /// This team's stored boxscore rows for the game, keyed by player id
    async fn load_team_boxscores(
        &self,
        season_id: &str,
        game_id: &str,
        team_id: &str,
    ) -> Result<BTreeMap<String, BoxscoreRow>, Error> {
        let mut out = BTreeMap::new();
        for (player_id, doc) in self.store.list(&collections::boxscores(season_id, game_id)).await? {
            let row: BoxscoreRow = from_document(doc)?;
            if row.team_id == team_id {
                out.insert(player_id, row);
            }
        }
        Ok(out)
    }

    async fn store_intervals(&self, season_id: &str, game_id: &str, csv: &str) {
        let summary = IntervalSummary {
            game_id: game_id.to_string(),
            season_id: season_id.to_string(),
            periods: parse_intervals(csv),
        };
        let result = match to_document(&summary) {
            Ok(doc) => self.store.set(&DocPath::intervals(season_id, game_id), doc).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                season_id = %season_id,
                game_id = %game_id,
                error = %e,
                "Failed to store interval summary"
            );
        }
    }
}

/// Incoming player: overwrite the boxscore, fold the delta into the
/// aggregate, refresh the game-log reference.
#[allow(clippy::too_many_arguments)]
fn queue_player_upsert(
    writer: &mut BatchWriter,
    season_id: &str,
    game_id: &str,
    team_id: &str,
    game: &Game,
    delta: &PlayerDelta,
    phase: &str,
    now: &str,
) -> Result<(), Error> {
    let Some(row) = &delta.row else {
        return Ok(());
    };
    let player_id = delta.player_id.as_str();

    let boxscore = BoxscoreRow::new(season_id, game_id, team_id, player_id, row.clone());
    let mut doc = to_document(&boxscore)?;
    doc.insert("updatedAt".into(), Value::String(now.to_string()));
    writer.set(DocPath::boxscore(season_id, game_id, player_id), doc);

    let mut identity = object(json!({
        "playerId": player_id,
        "teamId": team_id,
        "seasonId": season_id,
        "playerName": row.player_name(),
    }));
    if let Some(jersey) = jersey_number(row) {
        identity.insert("jerseyNumber".into(), jersey.into());
    }
    writer.update(
        DocPath::player_aggregate(season_id, player_id),
        identity,
        player_increments(delta, phase),
    );

    let game_ref = PlayerGameRef {
        game_id: game_id.to_string(),
        team_id: team_id.to_string(),
        date: game.date.clone(),
        points: row.int(POINTS),
        total_rebounds: row.int(TOTAL_REBOUNDS),
        assists: row.int(ASSISTS),
    };
    writer.merge(
        DocPath::player_game(season_id, player_id, game_id),
        to_document(&game_ref)?,
    );
    Ok(())
}


/// Removed player: take back their contribution and drop their per-game docs.
/// Identity fields on the aggregate are left alone.
fn queue_player_removal(
    writer: &mut BatchWriter,
    season_id: &str,
    game_id: &str,
    delta: &PlayerDelta,
    phase: &str,
) {
    let player_id = delta.player_id.as_str();
    writer.delete(DocPath::boxscore(season_id, game_id, player_id));
    if !delta.is_zero() {
        writer.push(WriteOp::increment(
            DocPath::player_aggregate(season_id, player_id),
            player_increments(delta, phase),
        ));
    }
    writer.delete(DocPath::player_game(season_id, player_id, game_id));
}

fn team_identity(season_id: &str, team_id: &str) -> Document {
    object(json!({ "teamId": team_id, "seasonId": season_id }))
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
