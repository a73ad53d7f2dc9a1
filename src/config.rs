//! Planner configuration, usually read from a TOML file.
//!
//! ```toml
//! rollover_hour = 23
//! week_start = "Mon"
//!
//! [storage]
//! kind = "json"
//! dir = "/var/lib/spark"
//!
//! [default_settings]
//! levels = ["basic", "standard"]
//! reviewPeriodDays = 14
//! reviewDays = ["Sun"]
//! ```

use crate::persistence::{JsonFileRecordStore, MemoryRecordStore, PersistenceError, RecordStore};
use crate::settings::{ScheduleSettings, SettingsError};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rollover_hour must be between 0 and 23, got {0}")]
    RolloverHour(u32),
    #[error("invalid default settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("storage backend '{0}' is not compiled in")]
    UnsupportedBackend(&'static str),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives the process.
    #[default]
    Memory,
    /// One JSON file per record key.
    Json { dir: PathBuf },
    Sqlite { path: PathBuf },
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Json { .. } => "json",
            StorageBackend::Sqlite { .. } => "sqlite",
        }
    }

    pub fn open(&self) -> ConfigResult<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match self {
            StorageBackend::Memory => Arc::new(MemoryRecordStore::new()),
            StorageBackend::Json { dir } => Arc::new(JsonFileRecordStore::new(dir)?),
            #[cfg(feature = "sqlite")]
            StorageBackend::Sqlite { path } => {
                Arc::new(crate::persistence::sqlite::SqliteRecordStore::new(path)?)
            }
            #[cfg(not(feature = "sqlite"))]
            StorageBackend::Sqlite { .. } => {
                return Err(ConfigError::UnsupportedBackend("sqlite"));
            }
        };
        tracing::debug!(backend = self.name(), "record store opened");
        Ok(store)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub storage: StorageBackend,
    pub rollover_hour: u32,
    pub week_start: Weekday,
    /// Used when nothing was saved under `schedule_settings` yet.
    pub default_settings: ScheduleSettings,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            rollover_hour: 23,
            week_start: Weekday::Mon,
            default_settings: ScheduleSettings::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: PlannerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.rollover_hour > 23 {
            return Err(ConfigError::RolloverHour(self.rollover_hour));
        }
        self.default_settings.validate()?;
        Ok(())
    }

    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PlannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn bad_rollover_hour_is_rejected() {
        let err = PlannerConfig::from_toml_str("rollover_hour = 24").unwrap_err();
        assert!(matches!(err, ConfigError::RolloverHour(24)));
    }
}
