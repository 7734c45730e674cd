//! On-disk core configuration.
//!
//! # Responsibility
//! - Load and persist the core settings: database path, logging, sync
//!   cadence and batch sizes.
//! - Mint and persist the stable per-install device id on first run.
//!
//! # Invariants
//! - `device_id` is generated exactly once and never changes afterwards;
//!   it is the deterministic conflict tie-break key for this install.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_PUSH_BATCH: u32 = 50;
const DEFAULT_PULL_BATCH: u32 = 100;

/// Core runtime settings, stored as JSON next to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    /// Stable per-install device identifier.
    pub device_id: String,
    pub sync_interval_secs: u64,
    pub push_batch: u32,
    pub pull_batch: u32,
}

impl CoreConfig {
    /// Builds defaults rooted at `data_dir`, minting a fresh device id.
    pub fn default_at(data_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join("expensync.db"),
            log_dir: data_dir.join("logs"),
            log_level: crate::logging::default_log_level().to_string(),
            device_id: Uuid::new_v4().to_string(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            push_batch: DEFAULT_PUSH_BATCH,
            pull_batch: DEFAULT_PULL_BATCH,
        }
    }

    /// Loads the config at `path`, creating and persisting defaults (with a
    /// newly minted device id) when the file does not exist yet.
    pub fn load_or_init(path: &Path, data_dir: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config: Self = serde_json::from_str(&text)
                    .map_err(|err| ConfigError::Parse(path.to_path_buf(), err))?;
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default_at(data_dir);
                config.save(path)?;
                Ok(config)
            }
            Err(err) => Err(ConfigError::Io(path.to_path_buf(), err)),
        }
    }

    /// Persists the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ConfigError::Io(parent.to_path_buf(), err))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|err| ConfigError::Parse(path.to_path_buf(), err))?;
        std::fs::write(path, text).map_err(|err| ConfigError::Io(path.to_path_buf(), err))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, err) => write!(f, "config io failure at `{}`: {err}", path.display()),
            Self::Parse(path, err) => {
                write!(f, "config parse failure at `{}`: {err}", path.display())
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(_, err) => Some(err),
            Self::Parse(_, err) => Some(err),
        }
    }
}
