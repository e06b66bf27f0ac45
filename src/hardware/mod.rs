pub mod detection;
pub mod probe;

pub use detection::{run_with_timeout, visible_devices_count, DetectionMethod};
pub use probe::{DetectionTier, FixedProbe, GpuCapabilityProbe, GpuProbe, ProbeResult, Tier};
