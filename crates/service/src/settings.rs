//! `crosslink.toml` loading.
//!
//! ```toml
//! [engine]
//! numeric_tolerance = 0.01
//! [engine.thresholds]
//! suspect_min_hits = 1
//! definite_min_hits = 2
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/crosslink/crosslink.db"
//!
//! [export]
//! dir = "/tmp/crosslink-exports"
//!
//! [server]
//! listen = "127.0.0.1:7878"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crosslink_recon::EngineConfig;
use crosslink_store::StoreBackend;

use crate::error::ServiceError;

const APP_DIR: &str = "crosslink";
const CONFIG_FILE: &str = "crosslink.toml";
const DB_FILE: &str = "crosslink.db";
const EXPORT_DIR: &str = "exports";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7878";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub store: StoreSettings,
    pub export: ExportSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: BackendKind,
    /// Database file. Defaults to `<data_dir>/crosslink/crosslink.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Load from the default location. A missing file means defaults.
    pub fn load() -> Result<Self, ServiceError> {
        let path = Self::config_path();
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ServiceError> {
        let contents = fs::read_to_string(path).map_err(|source| ServiceError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|message| ServiceError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(input: &str) -> Result<Self, String> {
        let settings: Settings = toml::from_str(input).map_err(|e| e.to_string())?;
        settings.engine.validate().map_err(|e| e.to_string())?;
        if settings.server.listen.trim().is_empty() {
            return Err("server.listen must not be empty".into());
        }
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ServiceError> {
        let io_err = |source| ServiceError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| ServiceError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, text).map_err(io_err)
    }

    pub fn store_backend(&self) -> StoreBackend {
        match self.store.backend {
            BackendKind::Memory => StoreBackend::Memory,
            BackendKind::Sqlite => StoreBackend::Sqlite(
                self.store
                    .path
                    .clone()
                    .unwrap_or_else(|| Self::data_dir().join(DB_FILE)),
            ),
        }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export
            .dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(EXPORT_DIR))
    }
}
