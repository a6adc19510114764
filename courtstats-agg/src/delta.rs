//! Delta computation for the incremental aggregation path
//!
//! Everything here is pure: given the incoming rows, the previously stored
//! boxscores and the game header, work out exactly which numbers move and
//! by how much. [`crate::upload`] turns the result into store writes.

use courtstats_common::fields::{JERSEY_NUMBER, POINTS};
use courtstats_common::models::{BoxscoreRow, Game, GameScores, Side, TeamCounters};
use courtstats_common::{NormalizedRow, StatLine};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Characters that would change the shape of a document path
const PATH_RESERVED: &[char] = &['/', '\\', '.', '#', '?', '%'];

/// Deterministic player id from team and display name.
///
/// Whitespace and path-reserved characters become single underscores, so
/// the id is always one path segment.
///
/// `("t1", "  Khulan  Bat ")` → `"t1__khulan_bat"`, `("t1", "Anu/Bat")` → `"t1__anu_bat"`
pub fn derive_player_id(team_id: &str, player_name: &str) -> String {
    let slug = player_name
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || PATH_RESERVED.contains(&c))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    format!("{}__{}", team_id, slug)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// First boxscore for this player in this game
    New,
    /// Re-upload of an existing boxscore
    Updated,
    /// Present before, absent from this upload
    Removed,
}

/// Change to one player's aggregate caused by one upload
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDelta {
    pub player_id: String,
    pub kind: DeltaKind,
    /// Incoming row (`None` for removed players)
    pub row: Option<NormalizedRow>,
    /// Per aggregatable field, `new - old`
    pub stats: StatLine,
    pub games_played: i64,
}

impl PlayerDelta {
    pub fn is_zero(&self) -> bool {
        self.games_played == 0 && self.stats.is_zero()
    }
}

/// Per-player deltas for one team's upload.
///
/// **Algorithm:**
/// 1. Rows without a player name are skipped
/// 2. Each row is keyed by its derived player id; a repeated id replaces
///    the earlier row
/// 3. delta = new − old per aggregatable field (old = 0 for new players);
///    gamesPlayed +1 only for new players
/// 4. Previously stored players missing from the upload get a full
///    negative delta and gamesPlayed −1
///
/// Incoming players keep upload order; removed players follow, by id.
pub fn compute_player_deltas(
    team_id: &str,
    rows: &[NormalizedRow],
    existing: &BTreeMap<String, BoxscoreRow>,
) -> Vec<PlayerDelta> {
    let mut incoming: Vec<(String, &NormalizedRow)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let name = row.player_name();
        if name.is_empty() {
            continue;
        }
        let player_id = derive_player_id(team_id, &name);
        match positions.get(&player_id) {
            Some(&pos) => {
                warn!(player_id = %player_id, "Duplicate player in upload, later row wins");
                incoming[pos].1 = row;
            }
            None => {
                positions.insert(player_id.clone(), incoming.len());
                incoming.push((player_id, row));
            }
        }
    }

    let mut deltas: Vec<PlayerDelta> = incoming
        .into_iter()
        .map(|(player_id, row)| {
            let new_stats = StatLine::from_row(row);
            match existing.get(&player_id) {
                Some(old) => PlayerDelta {
                    stats: StatLine::delta(&new_stats, &old.stats()),
                    player_id,
                    kind: DeltaKind::Updated,
                    row: Some(row.clone()),
                    games_played: 0,
                },
                None => PlayerDelta {
                    stats: new_stats,
                    player_id,
                    kind: DeltaKind::New,
                    row: Some(row.clone()),
                    games_played: 1,
                },
            }
        })
        .collect();

    for (player_id, old) in existing {
        if positions.contains_key(player_id) {
            continue;
        }
        deltas.push(PlayerDelta {
            player_id: player_id.clone(),
            kind: DeltaKind::Removed,
            row: None,
            stats: old.stats().negated(),
            games_played: -1,
        });
    }

    deltas
}

/// Sum of the `points` field over the incoming rows
pub fn team_points(deltas: &[PlayerDelta]) -> i64 {
    deltas
        .iter()
        .filter_map(|d| d.row.as_ref())
        .map(|row| row.int(POINTS))
        .fold(0i64, i64::saturating_add)
}

/// Final scores after `side` reports `points`; the other side keeps its
/// stored score (0 until it uploads)
pub fn scores_after_upload(game: &Game, side: Side, points: i64) -> GameScores {
    match side {
        Side::Home => GameScores {
            home: points,
            away: game.away_score,
        },
        Side::Away => GameScores {
            home: game.home_score,
            away: points,
        },
    }
}

/// Counter changes for both teams of a game
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultTransition {
    pub uploading: TeamCounters,
    pub opponent: TeamCounters,
}

/// Undo-then-apply transition of the game result.
///
/// If the game was already folded into team aggregates, the effect of the
/// stored scores is reversed for both teams before the effect of
/// `new_scores` is applied. gamesPlayed moves only the first time.
pub fn result_transition(game: &Game, side: Side, new_scores: GameScores) -> ResultTransition {
    let mut transition = ResultTransition::default();
    let opponent = side.opposite();

    if game.processed_aggregates {
        let previous = game.scores();
        transition
            .uploading
            .add(&TeamCounters::for_result(previous, side).negated());
        transition
            .opponent
            .add(&TeamCounters::for_result(previous, opponent).negated());
    } else {
        transition.uploading.games_played = 1;
        transition.opponent.games_played = 1;
    }

    transition
        .uploading
        .add(&TeamCounters::for_result(new_scores, side));
    transition
        .opponent
        .add(&TeamCounters::for_result(new_scores, opponent));

    transition
}

// ========================================
// Increment Maps
// ========================================

fn push_mirrored(out: &mut BTreeMap<String, i64>, phase: &str, field: &str, value: i64) {
    if value == 0 {
        return;
    }
    out.insert(field.to_string(), value);
    out.insert(format!("byPhase.{}.{}", phase, field), value);
}

/// Non-zero player increments, mirrored under `byPhase.<phase>`
pub fn player_increments(delta: &PlayerDelta, phase: &str) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    push_mirrored(&mut out, phase, "gamesPlayed", delta.games_played);
    for (field, value) in delta.stats.iter() {
        push_mirrored(&mut out, phase, field, value);
    }
    out
}

/// Non-zero team increments (counters plus stat sums), mirrored under
/// `byPhase.<phase>`
pub fn team_increments(counters: &TeamCounters, stats: &StatLine, phase: &str) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for (field, value) in counters.entries() {
        push_mirrored(&mut out, phase, field, value);
    }
    for (field, value) in stats.iter() {
        push_mirrored(&mut out, phase, field, value);
    }
    out
}

/// Jersey number carried on a row, if the CSV had one
pub fn jersey_number(row: &NormalizedRow) -> Option<i64> {
    row.get(JERSEY_NUMBER).map(|_| row.int(JERSEY_NUMBER))
}
