pub mod paths;
pub mod probe;
pub mod synthesis;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use paths::PathConfig;
pub use probe::ProbeConfig;
pub use synthesis::SynthesisConfig;

/// Main configuration for recipe resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathConfig,
    pub probe: ProbeConfig,
    pub synthesis: SynthesisConfig,
}

impl Config {
    /// Defaults plus values that only the process environment knows
    pub fn from_env() -> Self {
        Self {
            probe: ProbeConfig::from_env(),
            ..Default::default()
        }
    }

    /// Load a JSON or YAML config file; missing sections take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("Invalid JSON config {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?,
            _ => bail!("Unsupported config format: {}", path.display()),
        };
        Ok(config)
    }
}
