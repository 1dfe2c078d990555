//! Store configuration
//!
//! Stored as JSON. The store root defaults to `<data dir>/quarry` and can
//! be overridden with `QUARRY_STORE_DIR`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the default store root
pub const STORE_DIR_ENV: &str = "QUARRY_STORE_DIR";

/// Default zstd level for blobs at rest
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Where and how the local store keeps its data
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the store
    pub root: PathBuf,
    /// zstd compression level for stored blobs
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl StoreConfig {
    /// Configuration for a store at an explicit root
    pub fn at(root: impl Into<PathBuf>) -> Self {
        StoreConfig {
            root: root.into(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Configuration from the environment, falling back to the user data dir
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(STORE_DIR_ENV) {
            return Ok(Self::at(dir));
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not find data directory".into()))?;
        Ok(Self::at(data_dir.join("quarry")))
    }

    /// Load a config file; a missing file yields [`StoreConfig::from_env`]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::from_env();
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
