//! Season, game, boxscore and aggregate documents
//!
//! Documents are stored as JSON objects with camelCase keys. Aggregatable
//! stat sums are kept flat on the aggregate documents (`points`,
//! `fieldGoalsMade`, ...) and mirrored under `byPhase.<phase>`.

use crate::fields::{self, AGGREGATABLE_FIELDS};
use crate::normalize::{safe_float, safe_int};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ========================================
// Normalized Rows
// ========================================

/// One coerced CSV cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Integer view of the value (floats truncate, text parses leniently)
    pub fn as_i64(&self) -> i64 {
        match self {
            FieldValue::Int(v) => *v,
            FieldValue::Float(v) => *v as i64,
            FieldValue::Text(s) => safe_int(s),
        }
    }

    /// Render back to CSV cell text
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// Canonical field → value map produced by the row normalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRow(BTreeMap<String, FieldValue>);

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Numeric value of a field, 0 when absent
    pub fn int(&self, field: &str) -> i64 {
        self.0.get(field).map(FieldValue::as_i64).unwrap_or(0)
    }

    /// Float value of a field, 0.0 when absent
    pub fn float(&self, field: &str) -> f64 {
        match self.0.get(field) {
            Some(FieldValue::Int(v)) => *v as f64,
            Some(FieldValue::Float(v)) => *v,
            Some(FieldValue::Text(s)) => safe_float(s),
            None => 0.0,
        }
    }

    /// Trimmed text of a field ("" when absent)
    pub fn text(&self, field: &str) -> String {
        self.0
            .get(field)
            .map(|v| v.to_cell().trim().to_string())
            .unwrap_or_default()
    }

    pub fn player_name(&self) -> String {
        self.text(fields::PLAYER_NAME)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render the row back into raw `(header, cell)` pairs
    pub fn to_raw(&self) -> Vec<(String, String)> {
        self.0.iter().map(|(k, v)| (k.clone(), v.to_cell())).collect()
    }
}

impl<'de> Deserialize<'de> for NormalizedRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = NormalizedRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of boxscore fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut row = NormalizedRow::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    // Non-scalar values are not boxscore cells
                    if let Some(v) = FieldValue::from_json(&value) {
                        row.insert(key, v);
                    }
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// ========================================
// Stat Lines
// ========================================

/// Values of every aggregatable field, zero-filled
///
/// Serialized flat (one key per aggregatable field). Deserialization keeps
/// only catalog fields, so a StatLine can be flattened into a document that
/// also carries identity and bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatLine(BTreeMap<String, i64>);

impl Default for StatLine {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl StatLine {
    pub fn zeroed() -> Self {
        StatLine(
            AGGREGATABLE_FIELDS
                .iter()
                .map(|f| (f.to_string(), 0))
                .collect(),
        )
    }

    /// Pick the aggregatable fields out of a normalized row
    pub fn from_row(row: &NormalizedRow) -> Self {
        let mut line = Self::zeroed();
        for field in AGGREGATABLE_FIELDS {
            line.0.insert(field.to_string(), row.int(field));
        }
        line
    }

    pub fn get(&self, field: &str) -> i64 {
        self.0.get(field).copied().unwrap_or(0)
    }

    pub fn set(&mut self, field: &str, value: i64) {
        if fields::is_aggregatable(field) {
            self.0.insert(field.to_string(), value);
        }
    }

    pub fn add(&mut self, other: &StatLine) {
        for (field, value) in &other.0 {
            let total = self.0.entry(field.clone()).or_insert(0);
            *total = total.saturating_add(*value);
        }
    }

    /// Per-field `new - old`
    pub fn delta(new: &StatLine, old: &StatLine) -> StatLine {
        let mut out = Self::zeroed();
        for field in AGGREGATABLE_FIELDS {
            out.0.insert(field.to_string(), new.get(field).saturating_sub(old.get(field)));
        }
        out
    }

    pub fn negated(&self) -> StatLine {
        StatLine(self.0.iter().map(|(k, v)| (k.clone(), v.saturating_neg())).collect())
    }

    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<'de> Deserialize<'de> for StatLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatVisitor;

        impl<'de> Visitor<'de> for StatVisitor {
            type Value = StatLine;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of aggregatable stat fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut line = StatLine::zeroed();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    if !fields::is_aggregatable(&key) {
                        continue;
                    }
                    let n = match &value {
                        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                        _ => None,
                    };
                    if let Some(n) = n {
                        line.0.insert(key, n);
                    }
                }
                Ok(line)
            }
        }

        deserializer.deserialize_map(StatVisitor)
    }
}

// ========================================
// Seasons and Games
// ========================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub year: i64,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Scheduled,
    Live,
    Finished,
}

/// Game header document (`seasons/{s}/games/{g}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub home_team_id: String,
    #[serde(default)]
    pub away_team_id: String,
    #[serde(default)]
    pub home_score: i64,
    #[serde(default)]
    pub away_score: i64,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default = "default_phase")]
    pub phase: String,
    /// Whether this game's result has been folded into team aggregates
    #[serde(default)]
    pub processed_aggregates: bool,
}

fn default_phase() -> String {
    fields::DEFAULT_PHASE.to_string()
}

impl Game {
    pub fn new(home_team_id: &str, away_team_id: &str, date: &str) -> Self {
        Self {
            date: date.to_string(),
            home_team_id: home_team_id.to_string(),
            away_team_id: away_team_id.to_string(),
            home_score: 0,
            away_score: 0,
            status: GameStatus::Scheduled,
            phase: default_phase(),
            processed_aggregates: false,
        }
    }

    pub fn side_of(&self, team_id: &str) -> Option<Side> {
        if team_id == self.home_team_id {
            Some(Side::Home)
        } else if team_id == self.away_team_id {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn team_id(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team_id,
            Side::Away => &self.away_team_id,
        }
    }

    pub fn scores(&self) -> GameScores {
        GameScores {
            home: self.home_score,
            away: self.away_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameScores {
    pub home: i64,
    pub away: i64,
}

impl GameScores {
    pub fn of(&self, side: Side) -> i64 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    pub fn outcome_for(&self, side: Side) -> GameOutcome {
        let own = self.of(side);
        let other = self.of(side.opposite());
        match own.cmp(&other) {
            std::cmp::Ordering::Greater => GameOutcome::Win,
            std::cmp::Ordering::Less => GameOutcome::Loss,
            std::cmp::Ordering::Equal => GameOutcome::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    #[serde(rename = "W")]
    Win,
    #[serde(rename = "L")]
    Loss,
    #[serde(rename = "D")]
    Draw,
}

/// Parse a stored game date (RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`)
pub fn parse_game_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ========================================
// Boxscores
// ========================================

/// One player's stat line for one game (`seasons/{s}/games/{g}/boxscores/{p}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxscoreRow {
    pub player_id: String,
    pub team_id: String,
    pub game_id: String,
    pub season_id: String,
    #[serde(flatten)]
    pub fields: NormalizedRow,
}

impl BoxscoreRow {
    const IDENTITY_KEYS: [&'static str; 4] = ["playerId", "teamId", "gameId", "seasonId"];

    pub fn new(
        season_id: &str,
        game_id: &str,
        team_id: &str,
        player_id: &str,
        mut fields: NormalizedRow,
    ) -> Self {
        for key in Self::IDENTITY_KEYS {
            fields.remove(key);
        }
        Self {
            player_id: player_id.to_string(),
            team_id: team_id.to_string(),
            game_id: game_id.to_string(),
            season_id: season_id.to_string(),
            fields,
        }
    }

    pub fn stats(&self) -> StatLine {
        StatLine::from_row(&self.fields)
    }
}

/// Player game-log entry (`seasons/{s}/players/{p}/games/{g}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGameRef {
    pub game_id: String,
    pub team_id: String,
    pub date: String,
    pub points: i64,
    pub total_rebounds: i64,
    pub assists: i64,
}

// ========================================
// Aggregates
// ========================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPhaseTotals {
    #[serde(default)]
    pub games_played: i64,
    #[serde(flatten)]
    pub totals: StatLine,
}

/// Season-long running totals for one player (`seasons/{s}/playerAggregates/{p}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAggregate {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub season_id: String,
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub jersey_number: i64,
    #[serde(default)]
    pub games_played: i64,
    #[serde(flatten)]
    pub totals: StatLine,
    #[serde(default)]
    pub by_phase: BTreeMap<String, PlayerPhaseTotals>,
}

/// Win/loss and scoring counters kept per team (and per team per phase)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamCounters {
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub home_wins: i64,
    pub home_losses: i64,
    pub road_wins: i64,
    pub road_losses: i64,
    pub points_for: i64,
    pub points_against: i64,
}

impl TeamCounters {
    /// Field name / value pairs, document key spelling
    pub fn entries(&self) -> [(&'static str, i64); 9] {
        [
            ("gamesPlayed", self.games_played),
            ("wins", self.wins),
            ("losses", self.losses),
            ("homeWins", self.home_wins),
            ("homeLosses", self.home_losses),
            ("roadWins", self.road_wins),
            ("roadLosses", self.road_losses),
            ("pointsFor", self.points_for),
            ("pointsAgainst", self.points_against),
        ]
    }

    pub fn add(&mut self, other: &TeamCounters) {
        self.games_played = self.games_played.saturating_add(other.games_played);
        self.wins = self.wins.saturating_add(other.wins);
        self.losses = self.losses.saturating_add(other.losses);
        self.home_wins = self.home_wins.saturating_add(other.home_wins);
        self.home_losses = self.home_losses.saturating_add(other.home_losses);
        self.road_wins = self.road_wins.saturating_add(other.road_wins);
        self.road_losses = self.road_losses.saturating_add(other.road_losses);
        self.points_for = self.points_for.saturating_add(other.points_for);
        self.points_against = self.points_against.saturating_add(other.points_against);
    }

    pub fn negated(&self) -> TeamCounters {
        TeamCounters {
            games_played: self.games_played.saturating_neg(),
            wins: self.wins.saturating_neg(),
            losses: self.losses.saturating_neg(),
            home_wins: self.home_wins.saturating_neg(),
            home_losses: self.home_losses.saturating_neg(),
            road_wins: self.road_wins.saturating_neg(),
            road_losses: self.road_losses.saturating_neg(),
            points_for: self.points_for.saturating_neg(),
            points_against: self.points_against.saturating_neg(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.entries().iter().all(|(_, v)| *v == 0)
    }

    /// Counters contributed by one finished game, seen from `side`
    pub fn for_result(scores: GameScores, side: Side) -> TeamCounters {
        let own = scores.of(side);
        let other = scores.of(side.opposite());
        let mut c = TeamCounters {
            points_for: own,
            points_against: other,
            ..Default::default()
        };
        match (scores.outcome_for(side), side) {
            (GameOutcome::Win, Side::Home) => {
                c.wins = 1;
                c.home_wins = 1;
            }
            (GameOutcome::Win, Side::Away) => {
                c.wins = 1;
                c.road_wins = 1;
            }
            (GameOutcome::Loss, Side::Home) => {
                c.losses = 1;
                c.home_losses = 1;
            }
            (GameOutcome::Loss, Side::Away) => {
                c.losses = 1;
                c.road_losses = 1;
            }
            (GameOutcome::Draw, _) => {}
        }
        c
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPhaseTotals {
    #[serde(flatten)]
    pub counters: TeamCounters,
    #[serde(flatten)]
    pub totals: StatLine,
}

/// One entry of a team's newest-first recent results ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentResult {
    pub game_id: String,
    pub opponent_id: String,
    pub result: GameOutcome,
    pub score: i64,
    pub opponent_score: i64,
    pub date: String,
}

impl RecentResult {
    /// Entry for `side` of a game with the given final scores
    pub fn from_game(game_id: &str, game: &Game, scores: GameScores, side: Side) -> Self {
        Self {
            game_id: game_id.to_string(),
            opponent_id: game.team_id(side.opposite()).to_string(),
            result: scores.outcome_for(side),
            score: scores.of(side),
            opponent_score: scores.of(side.opposite()),
            date: game.date.clone(),
        }
    }
}

/// Season-long running totals for one team (`seasons/{s}/teamAggregates/{t}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAggregate {
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub season_id: String,
    #[serde(flatten)]
    pub counters: TeamCounters,
    #[serde(flatten)]
    pub totals: StatLine,
    #[serde(default)]
    pub by_phase: BTreeMap<String, TeamPhaseTotals>,
    #[serde(default)]
    pub recent_results: Vec<RecentResult>,
}
