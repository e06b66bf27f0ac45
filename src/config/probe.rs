use serde::{Deserialize, Serialize};

/// Environment variables carrying a device visibility mask, most specific first
pub const VISIBILITY_VARS: [&str; 3] = [
    "CUDA_VISIBLE_DEVICES",
    "HIP_VISIBLE_DEVICES",
    "ROCR_VISIBLE_DEVICES",
];

/// GPU probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound for each external detection call
    pub method_timeout_secs: u64,
    /// Interpreter used for the ML runtime device query
    pub python: String,
    /// Device visibility mask used when every detection method fails
    pub visible_devices: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method_timeout_secs: 10,
            python: "python3".to_string(),
            visible_devices: None,
        }
    }
}

impl ProbeConfig {
    /// Defaults with the visibility mask taken from the process environment
    pub fn from_env() -> Self {
        let visible_devices = VISIBILITY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok());
        Self {
            visible_devices,
            ..Default::default()
        }
    }
}
