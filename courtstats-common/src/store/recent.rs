//! Bounded, key-unique, newest-first arrays (the recent-results ring)

use super::{from_document, run_transaction, Document, DocumentStore};
use crate::models::RecentResult;
use crate::paths::DocPath;
use crate::Result;
use serde_json::Value;
use tracing::warn;

pub const RECENT_RESULTS_FIELD: &str = "recentResults";

/// Remove any entry sharing `entry`'s key, prepend `entry`, keep at most `max`
pub fn upsert_bounded<T, K, F>(list: Vec<T>, entry: T, key: F, max: usize) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let new_key = key(&entry);
    let mut out = Vec::with_capacity(list.len() + 1);
    out.push(entry);
    out.extend(list.into_iter().filter(|item| key(item) != new_key));
    out.truncate(max);
    out
}

/// Transactionally upsert one game result into a team aggregate's ring.
///
/// Other fields of the document are preserved. Retries on write conflict
/// until `max_wait_ms` elapses.
pub async fn upsert_recent_result(
    store: &dyn DocumentStore,
    path: &DocPath,
    entry: &RecentResult,
    max: usize,
    max_wait_ms: u64,
) -> Result<Vec<RecentResult>> {
    let update = |current: Option<Document>| -> Result<Document> {
        let mut doc = current.unwrap_or_default();
        let existing = read_recent(&doc, path);
        let next = upsert_bounded(existing, entry.clone(), |r| r.game_id.clone(), max);
        doc.insert(RECENT_RESULTS_FIELD.to_string(), serde_json::to_value(&next)?);
        Ok(doc)
    };

    let doc = run_transaction(store, path, max_wait_ms, &update).await?;
    Ok(read_recent(&doc, path))
}

fn read_recent(doc: &Document, path: &DocPath) -> Vec<RecentResult> {
    match doc.get(RECENT_RESULTS_FIELD) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => match from_document::<RecentResult>(map.clone()) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Dropping malformed recent result entry");
                        None
                    }
                },
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
