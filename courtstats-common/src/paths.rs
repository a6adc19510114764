//! Document path layout
//!
//! Every document lives at a slash-separated path whose segments alternate
//! collection / document id:
//!
//! ```text
//! seasons/{s}
//! seasons/{s}/games/{g}
//! seasons/{s}/games/{g}/boxscores/{p}
//! seasons/{s}/games/{g}/summary/intervals
//! seasons/{s}/playerAggregates/{p}
//! seasons/{s}/teamAggregates/{t}
//! seasons/{s}/players/{p}/games/{g}
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        DocPath(path.into())
    }

    pub fn season(season_id: &str) -> Self {
        DocPath(format!("seasons/{}", season_id))
    }

    pub fn game(season_id: &str, game_id: &str) -> Self {
        DocPath(format!("seasons/{}/games/{}", season_id, game_id))
    }

    pub fn boxscore(season_id: &str, game_id: &str, player_id: &str) -> Self {
        DocPath(format!(
            "seasons/{}/games/{}/boxscores/{}",
            season_id, game_id, player_id
        ))
    }

    pub fn intervals(season_id: &str, game_id: &str) -> Self {
        DocPath(format!("seasons/{}/games/{}/summary/intervals", season_id, game_id))
    }

    pub fn player_aggregate(season_id: &str, player_id: &str) -> Self {
        DocPath(format!("seasons/{}/playerAggregates/{}", season_id, player_id))
    }

    pub fn team_aggregate(season_id: &str, team_id: &str) -> Self {
        DocPath(format!("seasons/{}/teamAggregates/{}", season_id, team_id))
    }

    pub fn player_game(season_id: &str, player_id: &str, game_id: &str) -> Self {
        DocPath(format!(
            "seasons/{}/players/{}/games/{}",
            season_id, player_id, game_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent collection path (everything before the last segment)
    pub fn collection(&self) -> &str {
        self.0.rsplit_once('/').map(|(c, _)| c).unwrap_or("")
    }

    /// Document id (last segment)
    pub fn id(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, id)| id).unwrap_or(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collection paths used with `DocumentStore::list`
pub mod collections {
    pub fn seasons() -> String {
        "seasons".to_string()
    }

    pub fn games(season_id: &str) -> String {
        format!("seasons/{}/games", season_id)
    }

    pub fn boxscores(season_id: &str, game_id: &str) -> String {
        format!("seasons/{}/games/{}/boxscores", season_id, game_id)
    }

    pub fn player_aggregates(season_id: &str) -> String {
        format!("seasons/{}/playerAggregates", season_id)
    }

    pub fn team_aggregates(season_id: &str) -> String {
        format!("seasons/{}/teamAggregates", season_id)
    }
}
