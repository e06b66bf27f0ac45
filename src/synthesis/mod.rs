//! Launch configuration synthesis
//!
//! Turns a resolved slot into the command line, environment and bind mounts
//! handed to the external launcher. Synthesis performs no I/O.

pub mod cache;

pub use cache::{CacheAugmenter, CacheStats, CachedModel, LocalModelCache, NoCache};

use crate::catalog::SlotArgs;
use crate::resolver::ResolvedConfiguration;
use crate::types::{Backend, Precision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const VLLM_ENTRYPOINT: &str = "python -m vllm.entrypoints.openai.api_server";
pub const SGLANG_ENTRYPOINT: &str = "python -m sglang.launch_server";

/// Flags that take no value on the command line
pub const BOOLEAN_FLAGS: [&str; 10] = [
    "enable-prefix-caching",
    "enable-chunked-prefill",
    "trust-remote-code",
    "enforce-eager",
    "disable-log-requests",
    "disable-log-stats",
    "disable-custom-all-reduce",
    "enable-auto-tool-choice",
    "enable-torch-compile",
    "disable-radix-cache",
];

const TRUTHY_VALUES: [&str; 3] = ["true", "1", "yes"];

/// Mask exposing every device slot; the launcher narrows it per allocation
const DEFAULT_VISIBLE_DEVICES: &str = "0,1,2,3,4,5,6,7";

pub const DEFAULT_VOLUMES: [&str; 2] = [
    "/tmp/.cache:/tmp/.cache",
    "~/.cache/huggingface:/root/.cache/huggingface",
];

/// Device flags for ROCm containers
const ROCM_DEVICE_ARGS: [&str; 4] = [
    "--device=/dev/kfd",
    "--device=/dev/dri",
    "--group-add=video",
    "--group-add=render",
];

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("internal configuration error: {0}")]
    ConfigurationInternal(String),
}

/// Launch command, environment and volumes for one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedConfig {
    pub command: String,
    pub environment: BTreeMap<String, String>,
    /// Bind mounts as `hostPath:containerPath[:mode]`
    pub volumes: Vec<String>,
}

impl SynthesizedConfig {
    /// Merge cache-layer contributions; cache variables override synthesized ones
    pub fn merge_cache(&mut self, cache: &dyn CacheAugmenter, model_id: &str) {
        if cache.is_cached(model_id) {
            tracing::info!("Model {} found in cache, using cached weights", model_id);
        } else {
            tracing::info!("Model {} not in cache, weights will be downloaded", model_id);
        }

        self.environment.extend(cache.environment_for(model_id));
        self.volumes.extend(cache.volumes_for(model_id));
    }

    /// Argument vector for `docker` that would start this configuration
    pub fn docker_run_args(&self, image: &str, container_name: &str, port: u16) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "-d".to_string(),
        ];
        args.extend(ROCM_DEVICE_ARGS.iter().map(|a| a.to_string()));
        args.push("-p".to_string());
        args.push(format!("{}:{}", port, port));

        for (key, value) in &self.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }

        args.push(image.to_string());
        args.extend(self.command.split_whitespace().map(str::to_string));
        args
    }
}

fn entrypoint(backend: Backend) -> &'static str {
    match backend {
        Backend::Vllm => VLLM_ENTRYPOINT,
        Backend::Sglang => SGLANG_ENTRYPOINT,
    }
}

fn precision_variable(precision: Precision) -> &'static str {
    match precision {
        Precision::Fp16 => "VLLM_USE_FP16",
        Precision::Bf16 => "VLLM_USE_BF16",
        Precision::Fp8 => "VLLM_USE_FP8",
        Precision::Int8 => "VLLM_USE_INT8",
        Precision::Int4 => "VLLM_USE_INT4",
    }
}

fn backend_variable(backend: Backend) -> &'static str {
    match backend {
        Backend::Vllm => "VLLM_DISABLE_CUSTOM_ALLREDUCE",
        Backend::Sglang => "SGLANG_DISABLE_CUSTOM_ALLREDUCE",
    }
}

/// Strip any leading dashes a recipe author may have written
fn normalize_key(key: &str) -> &str {
    key.trim_start_matches('-')
}

pub fn is_boolean_flag(key: &str) -> bool {
    BOOLEAN_FLAGS.contains(&normalize_key(key))
}

fn is_truthy(value: &str) -> bool {
    TRUTHY_VALUES
        .iter()
        .any(|t| value.trim().eq_ignore_ascii_case(t))
}

/// Builds launch configurations from resolved slots
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigSynthesizer;

impl ConfigSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(
        &self,
        resolved: &ResolvedConfiguration,
        port: u16,
    ) -> Result<SynthesizedConfig, SynthesisError> {
        let args = resolved.args().ok_or_else(|| {
            SynthesisError::ConfigurationInternal(format!(
                "slot {} GPU(s) on {} is disabled in recipe {}",
                resolved.gpu_count, resolved.backend, resolved.recipe_id
            ))
        })?;

        let runtime_gpus = resolved.probe.runtime_visible.max(1);
        if resolved.gpu_count.get() > runtime_gpus {
            return Err(SynthesisError::ConfigurationInternal(format!(
                "recipe {} uses {} GPU(s) but the runtime only sees {}",
                resolved.recipe_id, resolved.gpu_count, runtime_gpus
            )));
        }

        let config = SynthesizedConfig {
            command: self.build_command(resolved.backend, args, port),
            environment: self.build_environment(resolved),
            volumes: DEFAULT_VOLUMES.iter().map(|v| v.to_string()).collect(),
        };

        tracing::info!("Generated configuration for {}", resolved.recipe_id);
        tracing::debug!("Configuration: {:?}", config);
        Ok(config)
    }

    /// Synthesize and then merge the cache layer's environment and volumes
    pub fn synthesize_with_cache(
        &self,
        resolved: &ResolvedConfiguration,
        port: u16,
        cache: &dyn CacheAugmenter,
    ) -> Result<SynthesizedConfig, SynthesisError> {
        let mut config = self.synthesize(resolved, port)?;
        config.merge_cache(cache, &resolved.model_id);
        Ok(config)
    }

    fn build_command(&self, backend: Backend, args: &SlotArgs, port: u16) -> String {
        let mut parts = vec![entrypoint(backend).to_string()];
        let mut has_port = false;

        for (key, value) in args.iter() {
            let key = normalize_key(key);

            if key == "port" {
                parts.push(format!("--port {}", port));
                has_port = true;
            } else if is_boolean_flag(key) {
                // An empty value is a bare flag written in list form
                if value.is_empty() || is_truthy(value) {
                    parts.push(format!("--{}", key));
                }
            } else if value.is_empty() {
                parts.push(format!("--{}", key));
            } else {
                parts.push(format!("--{} {}", key, value));
            }
        }

        if !has_port {
            parts.push(format!("--port {}", port));
        }

        parts.join(" ")
    }

    fn build_environment(&self, resolved: &ResolvedConfiguration) -> BTreeMap<String, String> {
        let mut environment = BTreeMap::new();
        environment.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        environment.insert(
            "CUDA_VISIBLE_DEVICES".to_string(),
            DEFAULT_VISIBLE_DEVICES.to_string(),
        );
        environment.insert(precision_variable(resolved.precision).to_string(), "1".to_string());
        environment.insert(backend_variable(resolved.backend).to_string(), "1".to_string());

        if resolved.requires_remote_code {
            environment.insert("HF_HUB_TRUST_REMOTE_CODE".to_string(), "1".to_string());
        }

        environment
    }
}
