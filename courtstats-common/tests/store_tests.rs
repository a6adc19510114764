//! Document store contract, run against the in-memory and SQLite backends

use courtstats_common::store::{
    run_transaction, BatchWriter, Document, DocumentStore, MemoryStore, SqliteStore, WriteBatch,
    WriteOp,
};
use courtstats_common::{DocPath, Error};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

fn incs(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

async fn sqlite_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join("docs.db")).await.unwrap()
}

// ========================================
// Contract checks (backend-agnostic)
// ========================================

async fn check_get_set_delete(store: &dyn DocumentStore) {
    let path = DocPath::game("s1", "g1");
    assert!(store.get(&path).await.unwrap().is_none());

    store.set(&path, doc(json!({"homeScore": 80}))).await.unwrap();
    assert_eq!(store.get(&path).await.unwrap().unwrap()["homeScore"], 80);

    let mut batch = WriteBatch::new();
    batch.push(WriteOp::delete(path.clone()));
    store.commit(batch).await.unwrap();
    assert!(store.get(&path).await.unwrap().is_none());
}

async fn check_list_direct_children_in_id_order(store: &dyn DocumentStore) {
    for id in ["g2", "g10", "g1"] {
        store
            .set(&DocPath::game("s1", id), doc(json!({"id": id})))
            .await
            .unwrap();
    }
    store
        .set(&DocPath::boxscore("s1", "g1", "t1__a"), doc(json!({"points": 3})))
        .await
        .unwrap();
    store
        .set(&DocPath::game("s2", "g1"), doc(json!({})))
        .await
        .unwrap();

    let ids: Vec<String> = store
        .list("seasons/s1/games")
        .await
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["g1", "g10", "g2"]);

    let boxscores = store.list("seasons/s1/games/g1/boxscores").await.unwrap();
    assert_eq!(boxscores.len(), 1);
    assert_eq!(boxscores[0].0, "t1__a");
}

async fn check_increment_and_merge(store: &dyn DocumentStore) {
    let path = DocPath::player_aggregate("s1", "t1__khulan");
    store
        .increment(&path, incs(&[("points", 10), ("byPhase.regular.points", 10)]))
        .await
        .unwrap();
    store
        .increment(&path, incs(&[("points", 4), ("byPhase.regular.points", 4)]))
        .await
        .unwrap();
    store
        .set_merge(&path, doc(json!({"playerName": "Khulan"})))
        .await
        .unwrap();

    let stored = store.get(&path).await.unwrap().unwrap();
    assert_eq!(stored["points"], 14);
    assert_eq!(stored["byPhase"]["regular"]["points"], 14);
    assert_eq!(stored["playerName"], "Khulan");
}

async fn check_batch_is_ordered_within_itself(store: &dyn DocumentStore) {
    let path = DocPath::team_aggregate("s1", "t1");
    let mut batch = WriteBatch::new();
    batch.push(WriteOp::set(path.clone(), doc(json!({"wins": 1}))));
    batch.push(WriteOp::increment(path.clone(), incs(&[("wins", 2)])));
    store.commit(batch).await.unwrap();
    assert_eq!(store.get(&path).await.unwrap().unwrap()["wins"], 3);
}

async fn check_oversized_batch_rejected(store: &dyn DocumentStore) {
    let limit = store.batch_limit();
    let mut batch = WriteBatch::new();
    for i in 0..=limit {
        batch.push(WriteOp::set(
            DocPath::new(format!("big/{}", i)),
            Document::new(),
        ));
    }
    let result = store.commit(batch).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(store.list("big").await.unwrap().is_empty());
}

async fn check_batch_writer_commits_everything(store: &dyn DocumentStore) {
    let mut writer = BatchWriter::new(store.batch_limit());
    for i in 0..(store.batch_limit() * 2 + 1) {
        writer.set(DocPath::new(format!("many/{:04}", i)), doc(json!({"i": i})));
    }
    let expected = writer.op_count();
    assert_eq!(writer.commit_all(store).await.unwrap(), expected);
    assert_eq!(store.list("many").await.unwrap().len(), expected);
}

async fn check_transaction_updates_existing_doc(store: &dyn DocumentStore) {
    let path = DocPath::team_aggregate("s1", "t9");
    store.set(&path, doc(json!({"n": 0, "keep": "me"}))).await.unwrap();

    let bump = |current: Option<Document>| -> courtstats_common::Result<Document> {
        let mut d = current.unwrap_or_default();
        let n = d.get("n").and_then(Value::as_i64).unwrap_or(0);
        d.insert("n".into(), (n + 1).into());
        Ok(d)
    };
    let first = store.read_modify_write(&path, &bump).await.unwrap();
    assert_eq!(first["n"], 1);

    let second = run_transaction(store, &path, 1000, &bump).await.unwrap();
    assert_eq!(second["n"], 2);
    assert_eq!(store.get(&path).await.unwrap().unwrap()["keep"], "me");
}

async fn check_transaction_error_writes_nothing(store: &dyn DocumentStore) {
    let path = DocPath::team_aggregate("s1", "t8");
    let fail = |_: Option<Document>| -> courtstats_common::Result<Document> {
        Err(Error::InvalidInput("rejected".into()))
    };
    let result = run_transaction(store, &path, 1000, &fail).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(store.get(&path).await.unwrap().is_none());
}

async fn check_transaction_creates_missing_doc(store: &dyn DocumentStore) {
    let path = DocPath::team_aggregate("s1", "new");
    let create = |current: Option<Document>| -> courtstats_common::Result<Document> {
        assert!(current.is_none());
        Ok(doc(json!({"created": true})))
    };
    run_transaction(store, &path, 1000, &create).await.unwrap();
    assert_eq!(store.get(&path).await.unwrap().unwrap()["created"], true);
}

// ========================================
// MemoryStore
// ========================================

#[tokio::test]
async fn test_memory_get_set_delete() {
    check_get_set_delete(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_list() {
    check_list_direct_children_in_id_order(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_increment_and_merge() {
    check_increment_and_merge(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_batch_order() {
    check_batch_is_ordered_within_itself(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_oversized_batch() {
    check_oversized_batch_rejected(&MemoryStore::new().with_batch_limit(5)).await;
}

#[tokio::test]
async fn test_memory_batch_writer() {
    check_batch_writer_commits_everything(&MemoryStore::new().with_batch_limit(4)).await;
}

#[tokio::test]
async fn test_memory_transactions() {
    let store = MemoryStore::new();
    check_transaction_updates_existing_doc(&store).await;
    check_transaction_creates_missing_doc(&store).await;
    check_transaction_error_writes_nothing(&store).await;
}

#[tokio::test]
async fn test_memory_concurrent_increments_commute() {
    let store = Arc::new(MemoryStore::new());
    let path = DocPath::team_aggregate("s1", "t1");
    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            store.increment(&path, incs(&[("points", 2)])).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(store.get(&path).await.unwrap().unwrap()["points"], 100);
}

// ========================================
// SqliteStore
// ========================================

#[tokio::test]
async fn test_sqlite_get_set_delete() {
    let dir = TempDir::new().unwrap();
    check_get_set_delete(&sqlite_store(&dir).await).await;
}

#[tokio::test]
async fn test_sqlite_list() {
    let dir = TempDir::new().unwrap();
    check_list_direct_children_in_id_order(&sqlite_store(&dir).await).await;
}

#[tokio::test]
async fn test_sqlite_increment_and_merge() {
    let dir = TempDir::new().unwrap();
    check_increment_and_merge(&sqlite_store(&dir).await).await;
}

#[tokio::test]
async fn test_sqlite_batch_order() {
    let dir = TempDir::new().unwrap();
    check_batch_is_ordered_within_itself(&sqlite_store(&dir).await).await;
}

#[tokio::test]
async fn test_sqlite_oversized_batch() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await.with_batch_limit(5);
    check_oversized_batch_rejected(&store).await;
}

#[tokio::test]
async fn test_sqlite_batch_writer() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await.with_batch_limit(4);
    check_batch_writer_commits_everything(&store).await;
}

#[tokio::test]
async fn test_sqlite_transactions() {
    let dir = TempDir::new().unwrap();
    let store = sqlite_store(&dir).await;
    check_transaction_updates_existing_doc(&store).await;
    check_transaction_creates_missing_doc(&store).await;
    check_transaction_error_writes_nothing(&store).await;
}

#[tokio::test]
async fn test_sqlite_reopen_keeps_documents() {
    let dir = TempDir::new().unwrap();
    let path = DocPath::season("s1");
    {
        let store = sqlite_store(&dir).await;
        store
            .set(&path, doc(json!({"name": "2025", "isActive": true})))
            .await
            .unwrap();
        store.pool().close().await;
    }
    let store = sqlite_store(&dir).await;
    assert_eq!(store.get(&path).await.unwrap().unwrap()["isActive"], true);
}

#[tokio::test]
async fn test_sqlite_recreated_document_never_reuses_a_version() {
    let dir = TempDir::new().unwrap();
    let path = DocPath::new("teams/t1");
    let mut seen = Vec::new();
    {
        let store = sqlite_store(&dir).await;
        store.set(&path, doc(json!({"wins": 1}))).await.unwrap();
        seen.push(store.version(&path).await.unwrap().unwrap());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::delete(path.clone()));
        store.commit(batch).await.unwrap();
        assert_eq!(store.version(&path).await.unwrap(), None);

        store.set(&path, doc(json!({"wins": 1}))).await.unwrap();
        seen.push(store.version(&path).await.unwrap().unwrap());

        let update = |current: Option<Document>| -> courtstats_common::Result<Document> {
            let mut d = current.unwrap_or_default();
            d.insert("wins".into(), json!(2));
            Ok(d)
        };
        run_transaction(&store, &path, 1000, &update).await.unwrap();
        seen.push(store.version(&path).await.unwrap().unwrap());
        store.pool().close().await;
    }

    // The clock survives a reopen
    let store = sqlite_store(&dir).await;
    store.increment(&path, incs(&[("wins", 1)])).await.unwrap();
    seen.push(store.version(&path).await.unwrap().unwrap());

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "versions {:?}", seen);
}
