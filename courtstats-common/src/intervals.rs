//! Period/interval scoring summary uploaded alongside a boxscore

use crate::normalize::{parse_csv, safe_int};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRow {
    pub period: i64,
    pub interval_index: i64,
    pub start_min: i64,
    pub end_min: i64,
    pub home_points: i64,
    pub away_points: i64,
}

/// Document stored at `seasons/{s}/games/{g}/summary/intervals`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSummary {
    pub game_id: String,
    pub season_id: String,
    pub periods: Vec<IntervalRow>,
}

/// Parse an interval CSV; headers are matched exactly, missing cells read as 0
pub fn parse_intervals(input: impl AsRef<[u8]>) -> Vec<IntervalRow> {
    parse_csv(input)
        .rows
        .iter()
        .map(|raw| {
            let cell = |name: &str| {
                raw.iter()
                    .find(|(h, _)| h == name)
                    .map(|(_, v)| safe_int(v))
                    .unwrap_or(0)
            };
            IntervalRow {
                period: cell("period"),
                interval_index: cell("intervalIndex"),
                start_min: cell("startMin"),
                end_min: cell("endMin"),
                home_points: cell("homePoints"),
                away_points: cell("awayPoints"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_intervals() {
        let rows = parse_intervals(
            "period,intervalIndex,startMin,endMin,homePoints,awayPoints\n\
             1,0,0,5,12,9\n\
             1,1,5,10,x,11\n",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].home_points, 12);
        assert_eq!(rows[1].home_points, 0);
        assert_eq!(rows[1].away_points, 11);
    }

    #[test]
    fn test_parse_intervals_missing_columns() {
        let rows = parse_intervals("period,homePoints\n2,20\n");
        assert_eq!(
            rows,
            vec![IntervalRow {
                period: 2,
                home_points: 20,
                ..Default::default()
            }]
        );
    }
}
