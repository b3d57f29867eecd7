//! Tests for the partition key/value store
//!
//! These tests verify:
//! - Save/read with field merging
//! - Key listing and removal
//! - Name validation

use filedb::partition::{Document, PartitionStore};
use filedb::FileDbError;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PartitionStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = PartitionStore::new(temp_dir.path());
    (temp_dir, store)
}

fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

// =============================================================================
// Save/Read Tests
// =============================================================================

#[test]
fn test_save_then_read() {
    let (temp, store) = setup_temp_store();

    store
        .save("settings", "theme", doc(json!({ "color": "dark", "size": 12 })))
        .unwrap();

    assert_eq!(
        store.read("settings", "theme").unwrap(),
        Some(doc(json!({ "color": "dark", "size": 12 })))
    );
    assert!(temp.path().join("storage/settings/theme").is_file());
}

#[test]
fn test_save_merges_existing_fields() {
    let (_temp, store) = setup_temp_store();

    store
        .save("s", "k", doc(json!({ "a": 1, "b": [1, 2] })))
        .unwrap();
    store
        .save("s", "k", doc(json!({ "b": { "nested": true }, "c": null })))
        .unwrap();

    assert_eq!(
        store.read("s", "k").unwrap(),
        Some(doc(json!({ "a": 1, "b": { "nested": true }, "c": null })))
    );
}

#[test]
fn test_read_missing_key() {
    let (_temp, store) = setup_temp_store();
    assert_eq!(store.read("s", "nothing").unwrap(), None);
}

#[test]
fn test_read_non_object_file() {
    let (temp, store) = setup_temp_store();
    let dir = temp.path().join("storage/s");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("k"), "[1,2,3]").unwrap();

    assert_eq!(store.read("s", "k").unwrap(), None);
}

// =============================================================================
// Keys/Remove Tests
// =============================================================================

#[test]
fn test_keys_sorted() {
    let (_temp, store) = setup_temp_store();
    assert!(store.keys("s").unwrap().is_empty());

    for key in ["b", "a", "c"] {
        store.save("s", key, Document::new()).unwrap();
    }

    assert_eq!(store.keys("s").unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_remove() {
    let (_temp, store) = setup_temp_store();
    store.save("s", "k", Document::new()).unwrap();

    assert!(store.remove("s", "k").unwrap());
    assert!(!store.remove("s", "k").unwrap());
    assert_eq!(store.read("s", "k").unwrap(), None);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_keys_with_dots_and_symbols() {
    let (temp, store) = setup_temp_store();

    for key in ["site.json", "user@host", ".hidden", "a b"] {
        store
            .save("cfg.v2", key, doc(json!({ "key": key })))
            .unwrap();
        assert_eq!(
            store.read("cfg.v2", key).unwrap(),
            Some(doc(json!({ "key": key })))
        );
    }

    assert!(temp.path().join("storage/cfg.v2/site.json").is_file());
    assert_eq!(
        store.keys("cfg.v2").unwrap(),
        vec![".hidden", "a b", "site.json", "user@host"]
    );
}

#[test]
fn test_invalid_names_rejected() {
    let (_temp, store) = setup_temp_store();

    for (partition, key) in [
        ("../x", "k"),
        ("s", "../../etc"),
        ("", "k"),
        ("s", ""),
        ("s", "a/b"),
        ("s", "a\\b"),
        ("s", "."),
        ("s", ".."),
        ("..", "k"),
    ] {
        assert!(matches!(
            store.save(partition, key, Document::new()),
            Err(FileDbError::InvalidKey(_))
        ));
    }
}
