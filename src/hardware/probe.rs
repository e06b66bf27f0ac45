//! Three-tier GPU visibility probe
//!
//! The serving runtime, the container and the host can each see a different
//! number of accelerators. Every tier walks an ordered preference list of
//! detection methods; the first positive count wins. When no method answers,
//! the tier falls back to the configured device visibility mask, then to 1.

use super::detection::{visible_devices_count, DetectionMethod, NvidiaSmi, RocmSmi, TorchDeviceCount};
use crate::config::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// GPU counts seen at each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// What the serving process itself can use; authoritative for sizing
    pub runtime_visible: u32,
    pub container_visible: u32,
    pub host_visible: u32,
}

impl ProbeResult {
    pub fn new(runtime_visible: u32, container_visible: u32, host_visible: u32) -> Self {
        Self {
            runtime_visible,
            container_visible,
            host_visible,
        }
    }

    /// Same count at every tier
    pub fn uniform(count: u32) -> Self {
        Self::new(count, count, count)
    }
}

/// Source of hardware visibility for a resolution
pub trait GpuProbe {
    fn probe(&self) -> ProbeResult;
}

/// Probe returning a preset result, for dry runs and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub ProbeResult);

impl GpuProbe for FixedProbe {
    fn probe(&self) -> ProbeResult {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Runtime,
    Container,
    Host,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Runtime => "runtime",
            Tier::Container => "container",
            Tier::Host => "host",
        };
        f.write_str(name)
    }
}

/// Ordered preference list of detection methods for one tier
pub struct DetectionTier {
    tier: Tier,
    methods: Vec<Box<dyn DetectionMethod>>,
}

impl DetectionTier {
    pub fn new(tier: Tier, methods: Vec<Box<dyn DetectionMethod>>) -> Self {
        Self { tier, methods }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

/// Probe built from external detection tools
pub struct GpuCapabilityProbe {
    runtime: DetectionTier,
    container: DetectionTier,
    host: DetectionTier,
    method_timeout: Duration,
    visible_devices: Option<String>,
}

impl GpuCapabilityProbe {
    /// Standard tiers: the runtime and container ask torch first and then the
    /// vendor tools, the host only asks the vendor tools.
    pub fn new(config: &ProbeConfig) -> Self {
        let runtime = DetectionTier::new(
            Tier::Runtime,
            vec![
                Box::new(TorchDeviceCount::new(&config.python)),
                Box::new(RocmSmi),
                Box::new(NvidiaSmi),
            ],
        );
        let container = DetectionTier::new(
            Tier::Container,
            vec![
                Box::new(TorchDeviceCount::new(&config.python)),
                Box::new(RocmSmi),
                Box::new(NvidiaSmi),
            ],
        );
        let host = DetectionTier::new(Tier::Host, vec![Box::new(RocmSmi), Box::new(NvidiaSmi)]);

        Self::with_tiers(runtime, container, host, config)
    }

    pub fn with_tiers(
        runtime: DetectionTier,
        container: DetectionTier,
        host: DetectionTier,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            runtime,
            container,
            host,
            method_timeout: Duration::from_secs(config.method_timeout_secs),
            visible_devices: config.visible_devices.clone(),
        }
    }

    fn detect_tier(&self, tier: &DetectionTier, seen: &RefCell<HashMap<String, Option<u32>>>) -> u32 {
        for method in &tier.methods {
            let name = method.name().to_string();
            // Tools shared between tiers run at most once per probe
            let cached = seen.borrow().get(&name).copied();
            let count = match cached {
                Some(count) => count,
                None => {
                    let count = match method.detect(self.method_timeout) {
                        Ok(count) => Some(count),
                        Err(e) => {
                            tracing::warn!("GPU detection via {} failed: {:#}", name, e);
                            None
                        }
                    };
                    seen.borrow_mut().insert(name.clone(), count);
                    count
                }
            };

            match count {
                Some(count) if count > 0 => {
                    tracing::info!("Detected {} {} GPU(s) using {}", count, tier.tier, name);
                    return count;
                }
                Some(_) => tracing::debug!("{} reported 0 GPUs for {} tier", name, tier.tier),
                None => {}
            }
        }

        match visible_devices_count(self.visible_devices.as_deref()) {
            Some(count) => {
                tracing::info!(
                    "Using device visibility mask for {} tier: {} GPU(s)",
                    tier.tier,
                    count
                );
                count
            }
            None => {
                tracing::warn!("All GPU detection methods failed for {} tier, assuming 1 GPU", tier.tier);
                1
            }
        }
    }
}

impl GpuProbe for GpuCapabilityProbe {
    fn probe(&self) -> ProbeResult {
        let seen = RefCell::new(HashMap::new());
        let result = ProbeResult {
            runtime_visible: self.detect_tier(&self.runtime, &seen),
            container_visible: self.detect_tier(&self.container, &seen),
            host_visible: self.detect_tier(&self.host, &seen),
        };

        tracing::info!(
            "Runtime GPUs: {}, Container GPUs: {}, Host GPUs: {}",
            result.runtime_visible,
            result.container_visible,
            result.host_visible
        );
        result
    }
}
