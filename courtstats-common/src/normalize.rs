//! Boxscore CSV normalization
//!
//! Turns uploaded CSV text into canonical [`NormalizedRow`]s. Nothing in this
//! module fails on bad input: malformed cells coerce to 0, unknown headers
//! pass through with a warning, and rows missing required fields are
//! reported alongside the rows instead of being dropped.

use crate::fields;
use crate::models::{FieldValue, NormalizedRow};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One data record as `(header, cell)` pairs in column order
pub type RawRow = Vec<(String, String)>;

/// Parsed CSV: header row plus data rows
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Missing required fields for one row (0-based data row index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_index: usize,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Every data row, including those listed in `errors`
    pub rows: Vec<NormalizedRow>,
    pub errors: Vec<RowError>,
    pub unknown_headers: Vec<String>,
}

// ========================================
// Numeric Coercion
// ========================================

/// Largest magnitude a single integer cell can carry
pub const MAX_CELL_VALUE: i64 = 1_000_000_000;

/// Leading-prefix integer parse; 0 when no digits lead the (trimmed) input.
///
/// `"12"` → 12, `" -3 "` → -3, `"4.7"` → 4, `"7abc"` → 7, `"abc"` → 0.
/// Results are clamped to ±[`MAX_CELL_VALUE`].
pub fn safe_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return 0;
    }
    // Only digits remain, so a parse failure means overflow
    let value = digits[..end]
        .parse::<i64>()
        .map_or(MAX_CELL_VALUE, |v| v.min(MAX_CELL_VALUE));
    if negative {
        -value
    } else {
        value
    }
}

/// Leading-prefix float parse; 0.0 when no number leads the input
pub fn safe_float(raw: &str) -> f64 {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return 0.0;
    }
    // Optional exponent, only taken when complete
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-') | Some(b'+')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end]
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Split a `"made/attempted"` cell.
///
/// Exactly one `/` yields both halves; anything else is read as made-only.
pub fn parse_slash(raw: &str) -> (i64, i64) {
    let trimmed = raw.trim();
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() == 2 {
        (safe_int(parts[0]), safe_int(parts[1]))
    } else {
        (safe_int(trimmed), 0)
    }
}

// ========================================
// CSV Parsing
// ========================================

/// Parse CSV bytes into a header row plus data rows.
///
/// A UTF-8 byte-order mark is stripped, cells are trimmed, blank records are
/// skipped, and ragged rows are tolerated (extra cells dropped, missing
/// cells omitted). Invalid UTF-8 is replaced rather than rejected.
pub fn parse_csv(input: impl AsRef<[u8]>) -> CsvTable {
    let mut bytes = input.as_ref();
    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        bytes = rest;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut table = CsvTable::default();
    let mut header_seen = false;

    for (line, record) in reader.byte_records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line, error = %e, "Skipping unreadable CSV record");
                continue;
            }
        };
        let cells: Vec<String> = record
            .iter()
            .map(|c| String::from_utf8_lossy(c).trim().to_string())
            .collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        if !header_seen {
            table.headers = cells;
            header_seen = true;
            continue;
        }

        let row: RawRow = table
            .headers
            .iter()
            .zip(cells)
            .map(|(h, v)| (h.clone(), v))
            .collect();
        table.rows.push(row);
    }

    table
}

// ========================================
// Header Mapping
// ========================================

/// Raw header → canonical field resolution for one CSV
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    map: HashMap<String, String>,
    /// Headers with no alias, passed through under their raw name
    pub unknown: Vec<String>,
}

impl HeaderMap {
    /// Canonical name for a raw header (the header itself when unmapped)
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        match self.map.get(raw) {
            Some(field) => field.as_str(),
            None => fields::canonical_field(raw).unwrap_or(raw),
        }
    }
}

pub fn map_headers<S: AsRef<str>>(raw_headers: &[S]) -> HeaderMap {
    let mut mapping = HeaderMap::default();
    for raw in raw_headers {
        let raw = raw.as_ref();
        match fields::canonical_field(raw) {
            Some(field) => {
                mapping.map.insert(raw.to_string(), field.to_string());
            }
            None => {
                warn!(header = %raw, "Unknown CSV header, passing through unchanged");
                mapping.map.insert(raw.to_string(), raw.to_string());
                mapping.unknown.push(raw.to_string());
            }
        }
    }
    mapping
}

// ========================================
// Row Normalization
// ========================================

/// Coerce one raw row into canonical fields.
///
/// Slash fields keep their text and gain `<field>Made` / `<field>Attempted`;
/// slash expansion is applied last so it overrides explicit sub-field
/// columns. Numeric fields never fail (bad input → 0). Everything else is
/// trimmed text.
pub fn normalise_row(raw: &[(String, String)], headers: &HeaderMap) -> NormalizedRow {
    let mut row = NormalizedRow::new();
    let mut slash_cells = Vec::new();

    for (raw_header, raw_value) in raw {
        let field = headers.resolve(raw_header);
        if fields::is_slash(field) {
            slash_cells.push((field, raw_value));
        } else if fields::is_numeric(field) {
            let value = if fields::is_float(field) {
                FieldValue::Float(safe_float(raw_value))
            } else {
                FieldValue::Int(safe_int(raw_value))
            };
            row.insert(field, value);
        } else {
            row.insert(field, FieldValue::Text(raw_value.trim().to_string()));
        }
    }

    for (field, raw_value) in slash_cells {
        let (made, attempted) = parse_slash(raw_value);
        row.insert(field, FieldValue::Text(raw_value.trim().to_string()));
        row.insert(fields::made_field(field), FieldValue::Int(made));
        row.insert(fields::attempted_field(field), FieldValue::Int(attempted));
    }

    row
}

/// Required fields absent from the row (empty text counts as absent)
pub fn validate_row(row: &NormalizedRow) -> Vec<String> {
    fields::REQUIRED_FIELDS
        .iter()
        .filter(|field| match row.get(field) {
            None => true,
            Some(FieldValue::Text(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| field.to_string())
        .collect()
}

/// Full pipeline: parse, map headers, normalize and validate every row
pub fn parse_and_normalise(input: impl AsRef<[u8]>) -> NormalizeOutcome {
    let table = parse_csv(input);
    if table.rows.is_empty() {
        return NormalizeOutcome::default();
    }

    let headers = map_headers(&table.headers);
    let mut outcome = NormalizeOutcome {
        unknown_headers: headers.unknown.clone(),
        ..Default::default()
    };

    for (row_index, raw) in table.rows.iter().enumerate() {
        let row = normalise_row(raw, &headers);
        let missing = validate_row(&row);
        if !missing.is_empty() {
            debug!(row_index = row_index, missing = ?missing, "Row failed validation");
            outcome.errors.push(RowError { row_index, missing });
        }
        outcome.rows.push(row);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_safe_int_prefix_semantics() {
        assert_eq!(safe_int("12"), 12);
        assert_eq!(safe_int("  -3"), -3);
        assert_eq!(safe_int("4.7"), 4);
        assert_eq!(safe_int("7abc"), 7);
        assert_eq!(safe_int("abc"), 0);
        assert_eq!(safe_int(""), 0);
        assert_eq!(safe_int("-"), 0);
    }

    #[test]
    fn test_safe_int_clamps_huge_cells() {
        assert_eq!(safe_int("9223372036854775807"), MAX_CELL_VALUE);
        assert_eq!(safe_int("99999999999999999999999"), MAX_CELL_VALUE);
        assert_eq!(safe_int("-9223372036854775808"), -MAX_CELL_VALUE);
        assert_eq!(safe_int("1000000000"), MAX_CELL_VALUE);
    }

    #[test]
    fn test_safe_float_prefix_semantics() {
        assert_eq!(safe_float("41.7"), 41.7);
        assert_eq!(safe_float(".5"), 0.5);
        assert_eq!(safe_float("50%"), 50.0);
        assert_eq!(safe_float("1e2x"), 100.0);
        assert_eq!(safe_float("3e"), 3.0);
        assert_eq!(safe_float("n/a"), 0.0);
        assert_eq!(safe_float("."), 0.0);
    }

    #[test]
    fn test_parse_slash() {
        assert_eq!(parse_slash("5/12"), (5, 12));
        assert_eq!(parse_slash("7/7"), (7, 7));
        assert_eq!(parse_slash("0"), (0, 0));
        assert_eq!(parse_slash("7"), (7, 0));
        assert_eq!(parse_slash("1/2/3"), (1, 0));
        assert_eq!(parse_slash(""), (0, 0));
    }

    #[test]
    fn test_parse_csv_bom_blank_lines_and_ragged_rows() {
        let input = "\u{feff}Name,PTS,AST\n\nKhulan, 14 ,3\n,,\nBat,9\nSaraa,2,1,extra\n";
        let table = parse_csv(input);
        assert_eq!(table.headers, vec!["Name", "PTS", "AST"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][1], ("PTS".to_string(), "14".to_string()));
        assert_eq!(table.rows[1].len(), 2);
        assert_eq!(table.rows[2].len(), 3);
    }

    #[test]
    fn test_parse_csv_empty_input() {
        let table = parse_csv("");
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_map_headers_flags_unknown() {
        let headers = map_headers(&["Player", "FG%", "Shoe Size"]);
        assert_eq!(headers.resolve("Player"), fields::PLAYER_NAME);
        assert_eq!(headers.resolve("FG%"), fields::FIELD_GOAL_PERCENTAGE);
        assert_eq!(headers.resolve("Shoe Size"), "Shoe Size");
        assert_eq!(headers.unknown, vec!["Shoe Size".to_string()]);
    }

    #[test]
    fn test_normalise_row_coerces_values() {
        let input = raw(&[
            ("Player", " Khulan "),
            ("PTS", "14"),
            ("FG", "6/10"),
            ("FG%", "60.0"),
            ("AST", "x"),
            ("Shoe Size", "44"),
        ]);
        let headers = map_headers(&input.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>());
        let row = normalise_row(&input, &headers);

        assert_eq!(row.get("playerName"), Some(&FieldValue::Text("Khulan".into())));
        assert_eq!(row.get("points"), Some(&FieldValue::Int(14)));
        assert_eq!(row.get("fieldGoals"), Some(&FieldValue::Text("6/10".into())));
        assert_eq!(row.get("fieldGoalsMade"), Some(&FieldValue::Int(6)));
        assert_eq!(row.get("fieldGoalsAttempted"), Some(&FieldValue::Int(10)));
        assert_eq!(row.get("fieldGoalPercentage"), Some(&FieldValue::Float(60.0)));
        assert_eq!(row.get("assists"), Some(&FieldValue::Int(0)));
        assert_eq!(row.get("Shoe Size"), Some(&FieldValue::Text("44".into())));
    }

    #[test]
    fn test_normalise_row_is_idempotent() {
        let input = raw(&[
            ("#", "7"),
            ("Name", "Khulan"),
            ("MIN", "31"),
            ("3PT", "2/5"),
            ("FT%", "83.3"),
            ("PTS", "14"),
            ("Notes", "starter"),
        ]);
        let headers = map_headers(&input.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>());
        let once = normalise_row(&input, &headers);

        let again_raw = once.to_raw();
        let again_headers =
            map_headers(&again_raw.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>());
        let twice = normalise_row(&again_raw, &again_headers);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_validate_row_reports_missing() {
        let mut row = NormalizedRow::new();
        row.insert("playerName", FieldValue::Text("  ".into()));
        assert_eq!(validate_row(&row), vec!["playerName", "points"]);

        row.insert("playerName", FieldValue::Text("Bat".into()));
        row.insert("points", FieldValue::Int(0));
        assert!(validate_row(&row).is_empty());
    }

    #[test]
    fn test_parse_and_normalise_keeps_invalid_rows() {
        let outcome = parse_and_normalise("Name,PTS,REB\nKhulan,14,5\n,3,1\nBat,,2\n");
        assert_eq!(outcome.rows.len(), 3);
        assert_eq!(
            outcome.errors,
            vec![RowError {
                row_index: 1,
                missing: vec!["playerName".to_string()],
            }]
        );
        // Empty numeric cell coerces to 0 and is present
        assert_eq!(outcome.rows[2].int("points"), 0);
    }

    #[test]
    fn test_parse_and_normalise_header_only() {
        let outcome = parse_and_normalise("Name,PTS\n");
        assert!(outcome.rows.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
