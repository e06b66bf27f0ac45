//! Core value types shared by the catalog, resolver and synthesizer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest GPU count a recipe slot may address
pub const MIN_GPU_COUNT: u32 = 1;
/// Largest GPU count a recipe slot may address
pub const MAX_GPU_COUNT: u32 = 8;

/// GPU counts tried during fallback, most parallel first
pub const GPU_LADDER: [u32; 4] = [8, 4, 2, 1];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseValueError {
    #[error("unsupported precision '{0}', expected one of: fp16, bf16, fp8, int8, int4")]
    Precision(String),

    #[error("unsupported backend '{0}', expected one of: vllm, sglang")]
    Backend(String),

    #[error("gpu count must be between {MIN_GPU_COUNT} and {MAX_GPU_COUNT}, got {0}")]
    GpuCount(u32),
}

/// Numeric format of weights and activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp16,
    Bf16,
    Fp8,
    Int8,
    Int4,
}

impl Precision {
    pub const ALL: [Precision; 5] = [
        Precision::Fp16,
        Precision::Bf16,
        Precision::Fp8,
        Precision::Int8,
        Precision::Int4,
    ];

    /// Precisions tried when the requested one has no usable slot
    pub const FALLBACK_LADDER: [Precision; 3] = [Precision::Bf16, Precision::Fp16, Precision::Fp8];

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp16 => "fp16",
            Precision::Bf16 => "bf16",
            Precision::Fp8 => "fp8",
            Precision::Int8 => "int8",
            Precision::Int4 => "int4",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Precision::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseValueError::Precision(s.to_string()))
    }
}

/// Serving runtime that hosts the model process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Vllm,
    Sglang,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Vllm, Backend::Sglang];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Vllm => "vllm",
            Backend::Sglang => "sglang",
        }
    }

    /// Key of the per-backend slot table inside a recipe record
    pub fn serve_key(&self) -> String {
        format!("{}_serve", self.as_str())
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Vllm
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| ParseValueError::Backend(s.to_string()))
    }
}

/// GPU count addressable by a recipe slot, always within [1, 8]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct GpuCount(u32);

impl GpuCount {
    pub fn new(count: u32) -> Result<Self, ParseValueError> {
        if (MIN_GPU_COUNT..=MAX_GPU_COUNT).contains(&count) {
            Ok(Self(count))
        } else {
            Err(ParseValueError::GpuCount(count))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Key of this count inside a backend slot table, e.g. `4_gpu`
    pub fn slot_key(&self) -> String {
        format!("{}_gpu", self.0)
    }

    /// Parse a slot table key such as `4_gpu`
    pub fn from_slot_key(key: &str) -> Option<Self> {
        key.strip_suffix("_gpu")
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(|n| Self::new(n).ok())
    }
}

impl TryFrom<u32> for GpuCount {
    type Error = ParseValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GpuCount> for u32 {
    fn from(value: GpuCount) -> Self {
        value.0
    }
}

impl fmt::Display for GpuCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_parse() {
        assert_eq!("bf16".parse::<Precision>().unwrap(), Precision::Bf16);
        assert_eq!("int4".parse::<Precision>().unwrap(), Precision::Int4);
        assert!("fp32".parse::<Precision>().is_err());
        assert!("BF16".parse::<Precision>().is_err());
    }

    #[test]
    fn test_backend_serve_key() {
        assert_eq!(Backend::Vllm.serve_key(), "vllm_serve");
        assert_eq!(Backend::Sglang.serve_key(), "sglang_serve");
        assert!("tgi".parse::<Backend>().is_err());
    }

    #[test]
    fn test_gpu_count_bounds() {
        assert!(GpuCount::new(0).is_err());
        assert!(GpuCount::new(9).is_err());
        assert_eq!(GpuCount::new(8).unwrap().get(), 8);
    }

    #[test]
    fn test_gpu_slot_key() {
        assert_eq!(GpuCount::from_slot_key("4_gpu").unwrap().get(), 4);
        assert_eq!(GpuCount::new(2).unwrap().slot_key(), "2_gpu");
        assert!(GpuCount::from_slot_key("16_gpu").is_none());
        assert!(GpuCount::from_slot_key("four_gpu").is_none());
        assert!(GpuCount::from_slot_key("4").is_none());
    }
}
