//! Size-class driven defaults for GPU count and precision

use crate::types::Precision;
use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_CLASS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*[-_]?\s*b(?:illion)?$").unwrap());

/// Parameter count in billions for size classes such as `32B`, `70b`, `8-billion`
pub fn parse_size_class(size_class: &str) -> Option<u32> {
    let normalized = size_class.trim().to_lowercase();
    SIZE_CLASS_PATTERN
        .captures(&normalized)
        .and_then(|caps| caps[1].parse().ok())
}

/// Preferred tensor-parallel degree for a model size, bounded by what the
/// runtime can see
pub fn default_gpu_count(size_class: &str, runtime_visible: u32) -> u32 {
    let wanted = |gpus: u32| {
        if runtime_visible >= gpus {
            gpus
        } else {
            runtime_visible
        }
    };

    match parse_size_class(size_class) {
        Some(7) | Some(8) => 1,
        Some(13) | Some(14) => wanted(2),
        Some(32) | Some(34) => wanted(4),
        Some(70) | Some(72) => wanted(8),
        _ => runtime_visible,
    }
}

/// Small models run in fp16, everything else in bf16
pub fn default_precision(size_class: &str) -> Precision {
    match parse_size_class(size_class) {
        Some(7) | Some(8) => Precision::Fp16,
        _ => Precision::Bf16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_class() {
        assert_eq!(parse_size_class("32B"), Some(32));
        assert_eq!(parse_size_class("70b"), Some(70));
        assert_eq!(parse_size_class(" 8-billion "), Some(8));
        assert_eq!(parse_size_class("unknown"), None);
        assert_eq!(parse_size_class("A3B-30B"), None);
    }

    #[test]
    fn test_default_gpu_count() {
        assert_eq!(default_gpu_count("7B", 8), 1);
        assert_eq!(default_gpu_count("14B", 8), 2);
        assert_eq!(default_gpu_count("14B", 1), 1);
        assert_eq!(default_gpu_count("32B", 4), 4);
        assert_eq!(default_gpu_count("34B", 2), 2);
        assert_eq!(default_gpu_count("72B", 8), 8);
        assert_eq!(default_gpu_count("70B", 4), 4);
        assert_eq!(default_gpu_count("unknown", 3), 3);
        assert_eq!(default_gpu_count("235B", 8), 8);
    }

    #[test]
    fn test_default_precision() {
        assert_eq!(default_precision("8B"), Precision::Fp16);
        assert_eq!(default_precision("13B"), Precision::Bf16);
        assert_eq!(default_precision("unknown"), Precision::Bf16);
    }
}
