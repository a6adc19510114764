//! Shared fixtures for courtstats-agg integration tests
//!
//! Each test file uses a different subset of these.
#![allow(dead_code)]

use courtstats_agg::rebuild::RebuildHandle;
use courtstats_agg::reconcile::Reconciler;
use courtstats_agg::upload::{DeltaAggregator, UploadOutcome, UploadRequest};
use courtstats_common::config::AggregationConfig;
use courtstats_common::models::{Game, PlayerAggregate, Season, TeamAggregate};
use courtstats_common::store::{from_document, to_document, DocumentStore, MemoryStore};
use courtstats_common::DocPath;
use std::sync::Arc;

pub const SEASON: &str = "s2025";

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn aggregator(store: &Arc<MemoryStore>) -> DeltaAggregator {
    aggregator_with(store, AggregationConfig::default())
}

pub fn aggregator_with(store: &Arc<MemoryStore>, settings: AggregationConfig) -> DeltaAggregator {
    let store: Arc<dyn DocumentStore> = store.clone();
    DeltaAggregator::new(store, settings, RebuildHandle::disabled())
}

pub fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
    let store: Arc<dyn DocumentStore> = store.clone();
    Reconciler::new(store, AggregationConfig::default(), RebuildHandle::disabled())
}

pub async fn seed_season(store: &dyn DocumentStore, season_id: &str, active: bool) {
    let season = Season {
        name: format!("Season {}", season_id),
        year: 2025,
        is_active: active,
    };
    store
        .set(&DocPath::season(season_id), to_document(&season).unwrap())
        .await
        .unwrap();
}

pub async fn seed_game(store: &dyn DocumentStore, game_id: &str, home: &str, away: &str, date: &str) {
    seed_game_in_phase(store, game_id, home, away, date, "regular").await;
}

pub async fn seed_game_in_phase(
    store: &dyn DocumentStore,
    game_id: &str,
    home: &str,
    away: &str,
    date: &str,
    phase: &str,
) {
    let mut game = Game::new(home, away, date);
    game.phase = phase.to_string();
    store
        .set(&DocPath::game(SEASON, game_id), to_document(&game).unwrap())
        .await
        .unwrap();
}

pub fn request(game_id: &str, team_id: &str, csv: &str) -> UploadRequest {
    UploadRequest {
        season_id: SEASON.to_string(),
        game_id: game_id.to_string(),
        team_id: team_id.to_string(),
        csv: csv.to_string(),
        intervals_csv: None,
    }
}

pub async fn upload(agg: &DeltaAggregator, game_id: &str, team_id: &str, csv: &str) -> UploadOutcome {
    agg.upload(request(game_id, team_id, csv))
        .await
        .unwrap_or_else(|e| panic!("upload {}/{} failed: {}", game_id, team_id, e))
}

pub async fn game(store: &dyn DocumentStore, game_id: &str) -> Game {
    let doc = store.get(&DocPath::game(SEASON, game_id)).await.unwrap().unwrap();
    from_document(doc).unwrap()
}

pub async fn player(store: &dyn DocumentStore, player_id: &str) -> PlayerAggregate {
    let doc = store
        .get(&DocPath::player_aggregate(SEASON, player_id))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no aggregate for player {}", player_id));
    from_document(doc).unwrap()
}

pub async fn team(store: &dyn DocumentStore, team_id: &str) -> TeamAggregate {
    let doc = store
        .get(&DocPath::team_aggregate(SEASON, team_id))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no aggregate for team {}", team_id));
    from_document(doc).unwrap()
}
