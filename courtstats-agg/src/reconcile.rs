//! Full-season reconciliation
//!
//! Recomputes every player and team aggregate of a season from the game
//! headers and boxscore rows, then overwrites the stored aggregates. This is
//! both the repair tool for drift left by the incremental path and the
//! reference the incremental path is tested against.

use crate::delta::jersey_number;
use crate::rebuild::RebuildHandle;
use courtstats_common::config::AggregationConfig;
use courtstats_common::fields::DEFAULT_PHASE;
use courtstats_common::models::{
    parse_game_date, BoxscoreRow, Game, GameStatus, PlayerAggregate, RecentResult, Season, Side,
    TeamAggregate, TeamCounters,
};
use courtstats_common::paths::collections;
use courtstats_common::store::{from_document, to_document, BatchWriter, DocumentStore};
use courtstats_common::{DocPath, Error, Result, StatLine};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub season_id: String,
    pub players: usize,
    pub teams: usize,
    pub games: usize,
    pub skipped_games: usize,
    /// Stale aggregate documents removed
    pub deleted: usize,
}

/// Result of reconciling one season inside the all-active sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonOutcome {
    pub season_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReconcileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SeasonOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// In-memory recompute of one season
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonTotals {
    pub players: BTreeMap<String, PlayerAggregate>,
    pub teams: BTreeMap<String, TeamAggregate>,
    pub games: usize,
    pub skipped_games: usize,
}

pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    settings: AggregationConfig,
    rebuild: RebuildHandle,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>, settings: AggregationConfig, rebuild: RebuildHandle) -> Self {
        Self {
            store,
            settings,
            rebuild,
        }
    }

    /// Recompute all aggregates of a season without writing anything.
    ///
    /// **Algorithm:**
    /// 1. Walk the season's games in id order; skip unfinished games and
    ///    games missing a team id
    /// 2. Fold each game header into both teams' counters (once per team per
    ///    game) and record a recent-result entry for each side
    /// 3. Sum every boxscore row into its player's totals and into a per-team
    ///    total for the game, which is then added to the team
    /// 4. Sort each team's recent results newest first and keep the first N
    pub async fn compute_season(&self, season_id: &str) -> Result<SeasonTotals> {
        let mut totals = SeasonTotals::default();
        let mut counted: HashMap<String, HashSet<String>> = HashMap::new();

        for (game_id, doc) in self.store.list(&collections::games(season_id)).await? {
            let game: Game = match from_document(doc) {
                Ok(g) => g,
                Err(e) => {
                    warn!(season_id = %season_id, game_id = %game_id, error = %e, "Skipping unreadable game");
                    totals.skipped_games += 1;
                    continue;
                }
            };
            if game.status != GameStatus::Finished {
                debug!(season_id = %season_id, game_id = %game_id, status = ?game.status, "Skipping unfinished game");
                totals.skipped_games += 1;
                continue;
            }
            if game.home_team_id.is_empty() || game.away_team_id.is_empty() {
                warn!(season_id = %season_id, game_id = %game_id, "Skipping game with missing team id");
                totals.skipped_games += 1;
                continue;
            }

            totals.games += 1;
            let phase = if game.phase.trim().is_empty() {
                DEFAULT_PHASE.to_string()
            } else {
                game.phase.clone()
            };
            let scores = game.scores();

            for side in [Side::Home, Side::Away] {
                let team_id = game.team_id(side);
                let team = team_entry(&mut totals.teams, season_id, team_id);
                if counted
                    .entry(team_id.to_string())
                    .or_default()
                    .insert(game_id.clone())
                {
                    let mut counters = TeamCounters::for_result(scores, side);
                    counters.games_played = 1;
                    team.counters.add(&counters);
                    team.by_phase.entry(phase.clone()).or_default().counters.add(&counters);
                    team.recent_results
                        .push(RecentResult::from_game(&game_id, &game, scores, side));
                }
            }

            let mut per_team: BTreeMap<String, StatLine> = BTreeMap::new();
            for (player_id, doc) in self.store.list(&collections::boxscores(season_id, &game_id)).await? {
                let row: BoxscoreRow = match from_document(doc) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(game_id = %game_id, player_id = %player_id, error = %e, "Skipping unreadable boxscore row");
                        continue;
                    }
                };
                if game.side_of(&row.team_id).is_none() {
                    warn!(
                        game_id = %game_id,
                        player_id = %player_id,
                        team_id = %row.team_id,
                        "Skipping boxscore row for a team not in the game"
                    );
                    continue;
                }

                let stats = row.stats();
                let player = totals
                    .players
                    .entry(player_id.clone())
                    .or_insert_with(|| PlayerAggregate {
                        player_id: player_id.clone(),
                        season_id: season_id.to_string(),
                        ..Default::default()
                    });
                // Latest game (in id order) wins for identity fields
                player.team_id = row.team_id.clone();
                let name = row.fields.player_name();
                if !name.is_empty() {
                    player.player_name = name;
                }
                if let Some(jersey) = jersey_number(&row.fields) {
                    player.jersey_number = jersey;
                }
                player.games_played += 1;
                player.totals.add(&stats);
                let by_phase = player.by_phase.entry(phase.clone()).or_default();
                by_phase.games_played += 1;
                by_phase.totals.add(&stats);

                per_team.entry(row.team_id).or_default().add(&stats);
            }

            for (team_id, stats) in per_team {
                let team = team_entry(&mut totals.teams, season_id, &team_id);
                team.totals.add(&stats);
                team.by_phase.entry(phase.clone()).or_default().totals.add(&stats);
            }
        }

        for team in totals.teams.values_mut() {
            sort_recent_results(&mut team.recent_results, self.settings.max_recent_results);
        }

        Ok(totals)
    }

    /// Recompute a season and overwrite its aggregates.
    ///
    /// Aggregate documents the recompute did not produce are deleted.
    pub async fn reconcile_season(&self, season_id: &str) -> Result<ReconcileSummary> {
        if self.store.get(&DocPath::season(season_id)).await?.is_none() {
            return Err(Error::NotFound(format!("season {}", season_id)));
        }
        info!(season_id = %season_id, "Reconciliation started");

        let totals = self.compute_season(season_id).await?;

        let limit = self.settings.batch_limit.min(self.store.batch_limit());
        let mut writer = BatchWriter::new(limit);
        for (player_id, agg) in &totals.players {
            writer.set(DocPath::player_aggregate(season_id, player_id), to_document(agg)?);
        }
        for (team_id, agg) in &totals.teams {
            writer.set(DocPath::team_aggregate(season_id, team_id), to_document(agg)?);
        }

        let mut deleted = 0;
        for (player_id, _) in self.store.list(&collections::player_aggregates(season_id)).await? {
            if !totals.players.contains_key(&player_id) {
                writer.delete(DocPath::player_aggregate(season_id, &player_id));
                deleted += 1;
            }
        }
        for (team_id, _) in self.store.list(&collections::team_aggregates(season_id)).await? {
            if !totals.teams.contains_key(&team_id) {
                writer.delete(DocPath::team_aggregate(season_id, &team_id));
                deleted += 1;
            }
        }

        let ops = writer.commit_all(self.store.as_ref()).await?;
        self.rebuild.request(season_id);

        let summary = ReconcileSummary {
            season_id: season_id.to_string(),
            players: totals.players.len(),
            teams: totals.teams.len(),
            games: totals.games,
            skipped_games: totals.skipped_games,
            deleted,
        };
        info!(
            season_id = %season_id,
            players = summary.players,
            teams = summary.teams,
            games = summary.games,
            skipped_games = summary.skipped_games,
            deleted,
            ops,
            "Reconciliation finished"
        );
        Ok(summary)
    }

    /// Reconcile every active season; one season failing does not stop the rest
    pub async fn reconcile_active(&self) -> Result<Vec<SeasonOutcome>> {
        let mut outcomes = Vec::new();
        for (season_id, doc) in self.store.list(&collections::seasons()).await? {
            let season: Season = match from_document(doc) {
                Ok(s) => s,
                Err(e) => {
                    warn!(season_id = %season_id, error = %e, "Skipping unreadable season");
                    continue;
                }
            };
            if !season.is_active {
                continue;
            }

            let outcome = match self.reconcile_season(&season_id).await {
                Ok(summary) => SeasonOutcome {
                    season_id,
                    summary: Some(summary),
                    error: None,
                },
                Err(e) => {
                    error!(season_id = %season_id, error = %e, "Season reconciliation failed, continuing");
                    SeasonOutcome {
                        season_id,
                        summary: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn team_entry<'a>(
    teams: &'a mut BTreeMap<String, TeamAggregate>,
    season_id: &str,
    team_id: &str,
) -> &'a mut TeamAggregate {
    teams
        .entry(team_id.to_string())
        .or_insert_with(|| TeamAggregate {
            team_id: team_id.to_string(),
            season_id: season_id.to_string(),
            ..Default::default()
        })
}

/// Newest first by game date (unparseable dates last), ties by game id, then truncate
fn sort_recent_results(results: &mut Vec<RecentResult>, max: usize) {
    results.sort_by(|a, b| {
        parse_game_date(&b.date)
            .cmp(&parse_game_date(&a.date))
            .then_with(|| b.game_id.cmp(&a.game_id))
    });
    let mut seen = BTreeSet::new();
    results.retain(|r| seen.insert(r.game_id.clone()));
    results.truncate(max);
}

/// Run the all-active sweep every `period` (first run one period after start)
pub fn spawn_schedule(reconciler: Arc<Reconciler>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval() fires immediately; consume that tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!("Scheduled reconciliation starting");
            match reconciler.reconcile_active().await {
                Ok(outcomes) => {
                    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
                    info!(seasons = outcomes.len(), failed, "Scheduled reconciliation complete");
                }
                Err(e) => error!(error = %e, "Scheduled reconciliation could not list seasons"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtstats_common::models::GameOutcome;

    fn result(game_id: &str, date: &str) -> RecentResult {
        RecentResult {
            game_id: game_id.into(),
            opponent_id: "t2".into(),
            result: GameOutcome::Win,
            score: 1,
            opponent_score: 0,
            date: date.into(),
        }
    }

    #[test]
    fn test_sort_recent_results_date_descending() {
        let mut list = vec![
            result("g1", "2025-01-01"),
            result("g3", "2025-03-01T10:00:00Z"),
            result("g2", "garbage"),
            result("g4", "2025-02-01"),
        ];
        sort_recent_results(&mut list, 3);
        let ids: Vec<&str> = list.iter().map(|r| r.game_id.as_str()).collect();
        assert_eq!(ids, vec!["g3", "g4", "g1"]);
    }

    #[test]
    fn test_sort_recent_results_ties_by_game_id() {
        let mut list = vec![result("a", "2025-01-01"), result("b", "2025-01-01")];
        sort_recent_results(&mut list, 20);
        assert_eq!(list[0].game_id, "b");
    }
}
