use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use thiserror::Error;

/// Record holding the array of scheduled tasks.
pub const TASKS_KEY: &str = "scheduled_tasks";
/// Record holding per-problem attempt state, flat or nested.
pub const CATALOG_KEY: &str = "problem_catalog_state";
/// Record holding the last confirmed schedule settings.
pub const SETTINGS_KEY: &str = "schedule_settings";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid record key '{0}'")]
    InvalidKey(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Abstract key → JSON record storage.
///
/// Implementations must make `save_record` all-or-nothing for a single key.
pub trait RecordStore: Send + Sync {
    fn load_record(&self, key: &str) -> PersistenceResult<Option<Value>>;
    fn save_record(&self, key: &str, value: &Value) -> PersistenceResult<()>;
    /// Returns whether a record was present.
    fn remove_record(&self, key: &str) -> PersistenceResult<bool>;
}

/// Process-local store, used when no durable backend is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl RecordStore for MemoryRecordStore {
    fn load_record(&self, key: &str) -> PersistenceResult<Option<Value>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn save_record(&self, key: &str, value: &Value) -> PersistenceResult<()> {
        validate_key(key)?;
        self.records.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove_record(&self, key: &str) -> PersistenceResult<bool> {
        Ok(self.records.lock().remove(key).is_some())
    }
}

/// Keys double as file names for the JSON backend, so keep them boring.
pub(crate) fn validate_key(key: &str) -> PersistenceResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey(key.to_string()))
    }
}

pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{JsonFileRecordStore, load_tasks_from_csv, save_tasks_to_csv};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_round_trips_and_removes() {
        let store = MemoryRecordStore::new();
        assert!(store.load_record(TASKS_KEY).unwrap().is_none());
        store.save_record(TASKS_KEY, &json!([1, 2])).unwrap();
        assert_eq!(store.load_record(TASKS_KEY).unwrap(), Some(json!([1, 2])));
        assert!(store.remove_record(TASKS_KEY).unwrap());
        assert!(!store.remove_record(TASKS_KEY).unwrap());
    }

    #[test]
    fn keys_with_path_characters_are_rejected() {
        let store = MemoryRecordStore::new();
        let err = store.save_record("../escape", &json!(null)).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidKey(_)));
    }
}
