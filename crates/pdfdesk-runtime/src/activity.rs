#![forbid(unsafe_code)]

//! Recent-activity log.
//!
//! [`ActivityLog`] records what the user did with which file (opened,
//! merged, ran OCR on, ...), newest first, capped at a configured limit. The
//! log is persisted as a JSON array through a [`StorageBackend`] after every
//! mutation. Persistence failures are logged; they never make a mutation
//! fail.

use std::fmt;
use std::rc::Rc;

use pdfdesk_core::ActivitySettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::storage::{StorageBackend, StorageResult};

/// What kind of operation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Open,
    Edit,
    Convert,
    Merge,
    Split,
    Compress,
    Ocr,
    Other,
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub action: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// An entry before it gets an id and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub action: String,
    pub file_path: String,
    pub output_path: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl NewActivity {
    pub fn new(kind: ActivityKind, action: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            kind,
            action: action.into(),
            file_path: file_path.into(),
            output_path: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output_path: impl Into<String>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

type TimeSource = Box<dyn Fn() -> u64>;

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Newest-first activity list backed by storage.
pub struct ActivityLog {
    backend: Rc<dyn StorageBackend>,
    settings: ActivitySettings,
    items: Vec<ActivityEntry>,
    next_seq: u64,
    now_ms: TimeSource,
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog")
            .field("settings", &self.settings)
            .field("len", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl ActivityLog {
    /// An empty log. Call [`load`](Self::load) to pick up persisted entries.
    pub fn new(backend: Rc<dyn StorageBackend>, settings: ActivitySettings) -> Self {
        Self {
            backend,
            settings,
            items: Vec::new(),
            next_seq: 0,
            now_ms: Box::new(unix_millis),
        }
    }

    /// Replace the wall clock used for timestamps and ids.
    #[must_use]
    pub fn with_time_source(mut self, now_ms: impl Fn() -> u64 + 'static) -> Self {
        self.now_ms = Box::new(now_ms);
        self
    }

    /// Read persisted entries. A missing key leaves the log as it is; a
    /// read or decode failure also leaves it as it is and is returned.
    pub fn load(&mut self) -> StorageResult<usize> {
        let loaded = self
            .backend
            .get(&self.settings.storage_key)
            .and_then(|raw| match raw {
                Some(raw) => Ok(Some(serde_json::from_str::<Vec<ActivityEntry>>(&raw)?)),
                None => Ok(None),
            });
        match loaded {
            Ok(Some(mut items)) => {
                items.truncate(self.settings.limit);
                self.items = items;
                debug!(entries = self.items.len(), "activity log loaded");
                Ok(self.items.len())
            }
            Ok(None) => Ok(self.items.len()),
            Err(err) => {
                warn!(key = %self.settings.storage_key, error = %err, "failed to load activity log");
                Err(err)
            }
        }
    }

    /// Write the whole log under the configured key.
    pub fn save(&self) -> StorageResult<()> {
        let json = serde_json::to_string(&self.items)?;
        self.backend.set(&self.settings.storage_key, &json)
    }

    /// Record an operation at the front of the log.
    pub fn add(&mut self, activity: NewActivity) -> &ActivityEntry {
        let timestamp = (self.now_ms)();
        let id = format!("history-{timestamp}-{}", self.next_seq);
        self.next_seq += 1;
        self.items.insert(
            0,
            ActivityEntry {
                id,
                kind: activity.kind,
                action: activity.action,
                file_path: activity.file_path,
                output_path: activity.output_path,
                timestamp,
                metadata: activity.metadata,
            },
        );
        self.items.truncate(self.settings.limit);
        self.save_or_warn();
        &self.items[0]
    }

    /// Remove the entry with `id`. Returns `false` if there was none.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|entry| entry.id == id) else {
            return false;
        };
        self.items.remove(index);
        self.save_or_warn();
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.save_or_warn();
    }

    /// Every entry, newest first.
    #[must_use]
    pub fn items(&self) -> &[ActivityEntry] {
        &self.items
    }

    /// The newest `recent` entries.
    #[must_use]
    pub fn recent(&self) -> &[ActivityEntry] {
        let n = self.settings.recent.min(self.items.len());
        &self.items[..n]
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ActivityEntry> {
        self.items.iter().find(|entry| entry.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }

    fn save_or_warn(&self) {
        if let Err(err) = self.save() {
            warn!(key = %self.settings.storage_key, error = %err, "failed to save activity log");
        }
    }
}
