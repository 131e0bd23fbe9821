//! Persistence and Recovery Tests
//!
//! The record log is the only durable state: reopening a collection must
//! rebuild the position index by replay, honor delete markers and
//! last-writer-wins ordering, and survive a truncated trailing frame.

use plumedb::collection::{Collection, CollectionOptions, RemoveOptions, UpdateOptions};
use plumedb::db::{Db, DbOptions};
use plumedb::document::DocValue;
use serde_json::json;
use std::fs::OpenOptions;
use tempfile::TempDir;

fn open_collection(dir: &TempDir) -> Collection {
    Collection::open(&dir.path().join("things"), "things", CollectionOptions::default())
        .expect("failed to open collection")
}

#[tokio::test]
async fn test_reopen_replays_documents() {
    let dir = TempDir::new().unwrap();
    {
        let collection = open_collection(&dir);
        collection
            .insert(&[
                json!({"_id": "a", "num": 1}),
                json!({"_id": "b", "num": 2}),
                json!({"_id": "c", "num": 3}),
            ])
            .await
            .unwrap();
    }

    let collection = open_collection(&dir);
    assert_eq!(collection.count(&json!({})).await.unwrap(), 3);
    let b = collection.find_one(&json!({"_id": "b"})).await.unwrap().unwrap();
    assert_eq!(b.get("num"), Some(&DocValue::Number(2.0)));
}

#[tokio::test]
async fn test_reopen_honors_updates_and_deletes() {
    let dir = TempDir::new().unwrap();
    {
        let collection = open_collection(&dir);
        collection
            .insert(&[json!({"_id": "a", "num": 1}), json!({"_id": "b", "num": 2})])
            .await
            .unwrap();
        collection
            .update(
                &json!({"_id": "a"}),
                &json!({"$set": {"num": 9}}),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        collection
            .remove(&json!({"_id": "b"}), RemoveOptions::default())
            .await
            .unwrap();
    }

    let collection = open_collection(&dir);
    assert_eq!(collection.count(&json!({})).await.unwrap(), 1);
    let a = collection.find_one(&json!({"_id": "a"})).await.unwrap().unwrap();
    assert_eq!(a.get("num"), Some(&DocValue::Number(9.0)));
    assert!(collection.find_one(&json!({"_id": "b"})).await.unwrap().is_none());
}

#[tokio::test]
async fn test_truncated_tail_drops_only_last_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("things");
    {
        let collection = open_collection(&dir);
        collection
            .insert(&[json!({"_id": "a", "num": 1}), json!({"_id": "b", "num": 2})])
            .await
            .unwrap();
    }

    // Chop into the last frame, as a crash mid-append would.
    let len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 5).unwrap();

    let collection = open_collection(&dir);
    assert_eq!(collection.count(&json!({})).await.unwrap(), 1);
    assert!(collection.find_one(&json!({"_id": "a"})).await.unwrap().is_some());
    assert!(collection.find_one(&json!({"_id": "b"})).await.unwrap().is_none());

    // The tail was cut, so new appends land on a frame boundary and
    // survive another reopen.
    collection.insert(&[json!({"_id": "c", "num": 3})]).await.unwrap();
    drop(collection);

    let collection = open_collection(&dir);
    assert_eq!(collection.count(&json!({})).await.unwrap(), 2);
    assert!(collection.find_one(&json!({"_id": "c"})).await.unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_identifier_rejected() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir);
    collection.insert(&[json!({"_id": "a", "num": 1})]).await.unwrap();

    let err = collection.insert(&[json!({"_id": "a", "num": 2})]).await;
    assert!(err.is_err());

    // The original document is untouched.
    let a = collection.find_one(&json!({"_id": "a"})).await.unwrap().unwrap();
    assert_eq!(a.get("num"), Some(&DocValue::Number(1.0)));
}

#[tokio::test]
async fn test_partial_batch_stays_durable_before_failure() {
    let dir = TempDir::new().unwrap();
    {
        let collection = open_collection(&dir);
        collection.insert(&[json!({"_id": "dup"})]).await.unwrap();
        // The batch aborts on the duplicate, but "ok" was appended first
        // and stays durable.
        let err = collection
            .insert(&[json!({"_id": "ok"}), json!({"_id": "dup"})])
            .await;
        assert!(err.is_err());
    }

    let collection = open_collection(&dir);
    assert!(collection.find_one(&json!({"_id": "ok"})).await.unwrap().is_some());
    assert_eq!(collection.count(&json!({})).await.unwrap(), 2);
}

// =============================================================================
// Database container
// =============================================================================

#[tokio::test]
async fn test_db_reuses_open_collections() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path().join("data"), DbOptions::default()).unwrap();

    let c1 = db.collection("users").await.unwrap();
    c1.insert(&[json!({"_id": "a"})]).await.unwrap();
    let c2 = db.collection("users").await.unwrap();
    assert_eq!(c2.count(&json!({})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_db_rejects_bad_collection_names() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path().join("data"), DbOptions::default()).unwrap();

    assert!(db.collection("").await.is_err());
    assert!(db.collection("$internal").await.is_err());
    assert!(db.collection("../outside").await.is_err());
}

#[tokio::test]
async fn test_drop_collection_deletes_log() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path().join("data"), DbOptions::default()).unwrap();

    let users = db.collection("users").await.unwrap();
    users.insert(&[json!({"_id": "a"})]).await.unwrap();
    assert!(db.drop_collection("users").await.unwrap());
    assert!(!db.drop_collection("users").await.unwrap());

    let reopened = db.collection("users").await.unwrap();
    assert_eq!(reopened.count(&json!({})).await.unwrap(), 0);
}
