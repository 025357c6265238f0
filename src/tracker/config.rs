//! Tracker configuration

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for an [`AssetDependencyTracker`](super::AssetDependencyTracker).
///
/// Every field has a default, so a JSON config only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of imports running at the same time
    pub max_concurrent_imports: usize,
    /// Directory of the artifact store
    pub artifact_dir: PathBuf,
    /// Expected number of distinct assets, used to pre-size registries
    pub initial_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_imports: 4,
            artifact_dir: PathBuf::from("Library/Artifacts"),
            initial_capacity: 64,
        }
    }
}

impl TrackerConfig {
    /// Default configuration with a custom artifact directory
    pub fn with_artifact_dir(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_imports == 0 {
            return Err(Error::Config("max_concurrent_imports must be at least 1".into()));
        }
        if self.artifact_dir.as_os_str().is_empty() {
            return Err(Error::Config("artifact_dir must not be empty".into()));
        }
        Ok(())
    }
}
