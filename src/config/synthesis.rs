use serde::{Deserialize, Serialize};

/// Launch configuration defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub port: u16,
    /// Container image handed to the external launcher
    pub image: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            image: "rocm/vllm:latest".to_string(),
        }
    }
}
