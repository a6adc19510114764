//! Boxscore field catalog
//!
//! Canonical field names, the CSV header alias table, and the field
//! classifications (required, numeric, slash, aggregatable) shared by the
//! normalizer, the incremental aggregator and the reconciliation pass.
//!
//! Adding a stat means editing this module only; the aggregation code reads
//! every field list from here.

use once_cell::sync::Lazy;
use std::collections::HashMap;

// ========================================
// Canonical Field Names
// ========================================

pub const JERSEY_NUMBER: &str = "jerseyNumber";
pub const PLAYER_NAME: &str = "playerName";
pub const MINUTES_PLAYED: &str = "minutesPlayed";
pub const FIELD_GOALS: &str = "fieldGoals";
pub const FIELD_GOAL_PERCENTAGE: &str = "fieldGoalPercentage";
pub const TWO_POINT_FIELD_GOALS: &str = "twoPointFieldGoals";
pub const TWO_POINT_PERCENTAGE: &str = "twoPointPercentage";
pub const THREE_POINT_FIELD_GOALS: &str = "threePointFieldGoals";
pub const THREE_POINT_PERCENTAGE: &str = "threePointPercentage";
pub const FREE_THROWS: &str = "freeThrows";
pub const FREE_THROW_PERCENTAGE: &str = "freeThrowPercentage";
pub const OFFENSIVE_REBOUNDS: &str = "offensiveRebounds";
pub const DEFENSIVE_REBOUNDS: &str = "defensiveRebounds";
pub const TOTAL_REBOUNDS: &str = "totalRebounds";
pub const ASSISTS: &str = "assists";
pub const TURNOVERS: &str = "turnovers";
pub const STEALS: &str = "steals";
pub const BLOCKS: &str = "blocks";
pub const PERSONAL_FOULS_COMMITTED: &str = "personalFoulsCommitted";
pub const PERSONAL_FOULS_DRAWN: &str = "personalFoulsDrawn";
pub const PLUS_MINUS: &str = "plusMinus";
pub const POINTS: &str = "points";

/// Canonical boxscore columns in admin-template order
pub const CSV_HEADERS: &[&str] = &[
    JERSEY_NUMBER,
    PLAYER_NAME,
    MINUTES_PLAYED,
    FIELD_GOALS,
    FIELD_GOAL_PERCENTAGE,
    TWO_POINT_FIELD_GOALS,
    TWO_POINT_PERCENTAGE,
    THREE_POINT_FIELD_GOALS,
    THREE_POINT_PERCENTAGE,
    FREE_THROWS,
    FREE_THROW_PERCENTAGE,
    OFFENSIVE_REBOUNDS,
    DEFENSIVE_REBOUNDS,
    TOTAL_REBOUNDS,
    ASSISTS,
    TURNOVERS,
    STEALS,
    BLOCKS,
    PERSONAL_FOULS_COMMITTED,
    PERSONAL_FOULS_DRAWN,
    PLUS_MINUS,
    POINTS,
];

// ========================================
// Classifications
// ========================================

/// Fields every valid boxscore row must carry
pub const REQUIRED_FIELDS: &[&str] = &[PLAYER_NAME, POINTS];

/// Fields coerced to numbers (float when the name contains "percentage")
pub const NUMERIC_FIELDS: &[&str] = &[
    JERSEY_NUMBER,
    MINUTES_PLAYED,
    FIELD_GOAL_PERCENTAGE,
    TWO_POINT_PERCENTAGE,
    THREE_POINT_PERCENTAGE,
    FREE_THROW_PERCENTAGE,
    OFFENSIVE_REBOUNDS,
    DEFENSIVE_REBOUNDS,
    TOTAL_REBOUNDS,
    ASSISTS,
    TURNOVERS,
    STEALS,
    BLOCKS,
    PERSONAL_FOULS_COMMITTED,
    PERSONAL_FOULS_DRAWN,
    PLUS_MINUS,
    POINTS,
];

/// Fields encoded as "made/attempted" text
pub const SLASH_FIELDS: &[&str] = &[
    FIELD_GOALS,
    TWO_POINT_FIELD_GOALS,
    THREE_POINT_FIELD_GOALS,
    FREE_THROWS,
];

/// Fields summed into player and team aggregates, slash sub-fields included
pub const AGGREGATABLE_FIELDS: &[&str] = &[
    MINUTES_PLAYED,
    POINTS,
    OFFENSIVE_REBOUNDS,
    DEFENSIVE_REBOUNDS,
    TOTAL_REBOUNDS,
    ASSISTS,
    TURNOVERS,
    STEALS,
    BLOCKS,
    PERSONAL_FOULS_COMMITTED,
    PERSONAL_FOULS_DRAWN,
    PLUS_MINUS,
    "fieldGoalsMade",
    "fieldGoalsAttempted",
    "twoPointFieldGoalsMade",
    "twoPointFieldGoalsAttempted",
    "threePointFieldGoalsMade",
    "threePointFieldGoalsAttempted",
    "freeThrowsMade",
    "freeThrowsAttempted",
];

/// Maximum length of a team's recentResults list
pub const MAX_RECENT_RESULTS: usize = 20;

/// Per-commit operation ceiling for write batches
pub const BATCH_LIMIT: usize = 499;

/// Default competition phase when a game header carries none
pub const DEFAULT_PHASE: &str = "regular";

// ========================================
// Header Aliases
// ========================================

/// Extra spellings accepted in CSV headers, keyed by normalized header text
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("#", JERSEY_NUMBER),
    ("no", JERSEY_NUMBER),
    ("number", JERSEY_NUMBER),
    ("name", PLAYER_NAME),
    ("player", PLAYER_NAME),
    ("min", MINUTES_PLAYED),
    ("fg", FIELD_GOALS),
    ("fg%", FIELD_GOAL_PERCENTAGE),
    ("2pt", TWO_POINT_FIELD_GOALS),
    ("2p%", TWO_POINT_PERCENTAGE),
    ("3pt", THREE_POINT_FIELD_GOALS),
    ("3p%", THREE_POINT_PERCENTAGE),
    ("ft", FREE_THROWS),
    ("ft%", FREE_THROW_PERCENTAGE),
    ("oreb", OFFENSIVE_REBOUNDS),
    ("dreb", DEFENSIVE_REBOUNDS),
    ("reb", TOTAL_REBOUNDS),
    ("ast", ASSISTS),
    ("to", TURNOVERS),
    ("tov", TURNOVERS),
    ("stl", STEALS),
    ("blk", BLOCKS),
    ("pf", PERSONAL_FOULS_COMMITTED),
    ("pfd", PERSONAL_FOULS_DRAWN),
    ("+/-", PLUS_MINUS),
    ("pts", POINTS),
];

/// Normalized header text → canonical field name.
///
/// Every canonical name (and every slash sub-field name) maps to itself, so a
/// row that was already normalized resolves to the same fields again.
static HEADER_ALIAS_MAP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for field in CSV_HEADERS.iter().chain(AGGREGATABLE_FIELDS.iter()) {
        map.insert(normalize_header_key(field), *field);
    }
    for (alias, field) in HEADER_ALIASES {
        map.insert((*alias).to_string(), *field);
    }
    map
});

/// Normalize free-form header text for alias lookup.
///
/// Trims, lowercases and strips whitespace and underscores, so
/// `" Field_Goals "` and `"fieldgoals"` compare equal.
pub fn normalize_header_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect()
}

/// Resolve a raw CSV header to its canonical field, if known
pub fn canonical_field(raw_header: &str) -> Option<&'static str> {
    HEADER_ALIAS_MAP.get(&normalize_header_key(raw_header)).copied()
}

// ========================================
// Classification Lookups
// ========================================

pub fn is_required(field: &str) -> bool {
    REQUIRED_FIELDS.contains(&field)
}

pub fn is_slash(field: &str) -> bool {
    SLASH_FIELDS.contains(&field)
}

pub fn is_aggregatable(field: &str) -> bool {
    AGGREGATABLE_FIELDS.contains(&field)
}

/// Numeric fields plus the made/attempted sub-fields derived from slash fields
pub fn is_numeric(field: &str) -> bool {
    NUMERIC_FIELDS.contains(&field) || SLASH_FIELDS.iter().any(|s| is_sub_field_of(field, s))
}

/// Percentage-named fields are parsed as floats, everything else as integers
pub fn is_float(field: &str) -> bool {
    field.to_lowercase().contains("percentage")
}

/// Name of the "made" sub-field for a slash field (`fieldGoals` → `fieldGoalsMade`)
pub fn made_field(slash_field: &str) -> String {
    format!("{}Made", slash_field)
}

/// Name of the "attempted" sub-field for a slash field
pub fn attempted_field(slash_field: &str) -> String {
    format!("{}Attempted", slash_field)
}

fn is_sub_field_of(field: &str, slash_field: &str) -> bool {
    field
        .strip_prefix(slash_field)
        .map(|rest| rest == "Made" || rest == "Attempted")
        .unwrap_or(false)
}
