#![forbid(unsafe_code)]

//! File-backed persistence across "sessions" (fresh backend instances over
//! the same file).
//!
//! Run:
//!   cargo test -p pdfdesk-runtime --test storage_persistence

use std::fs;
use std::rc::Rc;

use pdfdesk_core::ActivitySettings;
use pdfdesk_runtime::{
    ActivityKind, ActivityLog, FileStorage, NewActivity, StorageBackend, StorageError, StoredValue,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ViewerPrefs {
    zoom: u32,
    sidebar: bool,
}

impl Default for ViewerPrefs {
    fn default() -> Self {
        Self {
            zoom: 100,
            sidebar: true,
        }
    }
}

#[test]
fn missing_file_opens_empty_and_is_created_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("storage.json");

    let storage = FileStorage::open(&path).unwrap();
    assert!(storage.keys().unwrap().is_empty());
    assert!(!path.exists());

    storage.set("k", "1").unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("nested").join("storage.json.tmp").exists());
}

#[test]
fn stored_value_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let backend: Rc<dyn StorageBackend> = Rc::new(FileStorage::open(&path).unwrap());
        let prefs = StoredValue::new(backend, "viewer", ViewerPrefs::default());
        prefs.update(|p| p.zoom = 150);
        assert!(prefs.take_error().is_none());
    }

    let backend: Rc<dyn StorageBackend> = Rc::new(FileStorage::open(&path).unwrap());
    let prefs = StoredValue::new(backend, "viewer", ViewerPrefs::default());
    assert_eq!(
        prefs.get(),
        ViewerPrefs {
            zoom: 150,
            sidebar: true
        }
    );
}

#[test]
fn file_is_a_json_object_of_strings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let storage = FileStorage::open(&path).unwrap();
    storage.set("theme", "\"dark\"").unwrap();
    storage.set("recent", "[1,2]").unwrap();

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        on_disk,
        serde_json::json!({ "recent": "[1,2]", "theme": "\"dark\"" })
    );

    assert!(storage.remove("theme").unwrap());
    let reopened = FileStorage::open(&path).unwrap();
    assert_eq!(reopened.keys().unwrap(), vec!["recent".to_string()]);

    reopened.clear().unwrap();
    assert!(FileStorage::open(&path).unwrap().keys().unwrap().is_empty());
}

#[test]
fn failed_write_leaves_memory_matching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let storage = FileStorage::open(&path).unwrap();
    storage.set("theme", "\"light\"").unwrap();

    // A directory squatting on the temp path makes every write fail, even
    // for a privileged user.
    fs::create_dir(dir.path().join("settings.json.tmp")).unwrap();

    assert!(matches!(
        storage.set("theme", "\"dark\""),
        Err(StorageError::Io { .. })
    ));
    assert_eq!(storage.get("theme").unwrap().as_deref(), Some("\"light\""));

    assert!(storage.set("zoom", "125").is_err());
    assert_eq!(storage.get("zoom").unwrap(), None);

    assert!(storage.remove("theme").is_err());
    assert!(storage.clear().is_err());
    assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);

    let reopened = FileStorage::open(&path).unwrap();
    assert_eq!(reopened.keys().unwrap(), storage.keys().unwrap());
    assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("\"light\""));
}

#[test]
fn stored_value_write_failure_is_kept_for_caller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");
    let backend: Rc<dyn StorageBackend> = Rc::new(FileStorage::open(&path).unwrap());
    let prefs = StoredValue::new(Rc::clone(&backend), "viewer", ViewerPrefs::default());

    fs::create_dir(dir.path().join("prefs.json.tmp")).unwrap();
    prefs.update(|p| p.zoom = 200);

    assert_eq!(prefs.get().zoom, 200);
    assert!(matches!(prefs.take_error(), Some(StorageError::Io { .. })));
    assert_eq!(backend.get("viewer").unwrap(), None);
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ this is not json").unwrap();
    assert!(matches!(FileStorage::open(&path), Err(StorageError::Json(_))));
}

#[test]
fn empty_file_is_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    fs::write(&path, "").unwrap();
    assert!(FileStorage::open(&path).unwrap().keys().unwrap().is_empty());
}

#[test]
fn activity_log_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");

    {
        let backend: Rc<dyn StorageBackend> = Rc::new(FileStorage::open(&path).unwrap());
        let mut log = ActivityLog::new(backend, ActivitySettings::default())
            .with_time_source(|| 1_000);
        log.add(NewActivity::new(ActivityKind::Open, "Opened file", "/docs/a.pdf"));
        log.add(
            NewActivity::new(ActivityKind::Compress, "Compressed", "/docs/a.pdf")
                .with_output("/docs/a-small.pdf")
                .with_metadata("ratio", 0.42),
        );
    }

    let backend: Rc<dyn StorageBackend> = Rc::new(FileStorage::open(&path).unwrap());
    let mut log = ActivityLog::new(backend, ActivitySettings::default());
    assert_eq!(log.load().unwrap(), 2);

    let newest = &log.items()[0];
    assert_eq!(newest.kind, ActivityKind::Compress);
    assert_eq!(newest.output_path.as_deref(), Some("/docs/a-small.pdf"));
    assert_eq!(newest.timestamp, 1_000);
    assert_eq!(log.recent().len(), 2);
}
