use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Catalog and cache locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding `models/` and `recipes/`
    pub config_dir: String,
    pub cache_dir: String,
    pub use_cache: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            config_dir: ".".to_string(),
            cache_dir: "/workspace/model-cache".to_string(),
            use_cache: true,
        }
    }
}

impl PathConfig {
    pub fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.config_dir).join("models")
    }

    pub fn recipes_dir(&self) -> PathBuf {
        PathBuf::from(&self.config_dir).join("recipes")
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }
}
