//! Cache-layer contributions to a launch configuration
//!
//! The cache itself is managed elsewhere; this module only reads its index to
//! decide which environment variables and bind mounts a deployment needs.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CACHE_INDEX_FILE: &str = "cache_index.json";
const CONTAINER_CACHE_DIR: &str = "/workspace/model-cache";
const CONTAINER_MODELS_DIR: &str = "/workspace/models";

/// Extra environment and mounts for a model whose weights may already be local
pub trait CacheAugmenter {
    fn is_cached(&self, model_id: &str) -> bool;
    fn environment_for(&self, model_id: &str) -> BTreeMap<String, String>;
    fn volumes_for(&self, model_id: &str) -> Vec<String>;
}

/// Cache layer that contributes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheAugmenter for NoCache {
    fn is_cached(&self, _model_id: &str) -> bool {
        false
    }

    fn environment_for(&self, _model_id: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn volumes_for(&self, _model_id: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(default)]
    cached: bool,
    cache_path: Option<String>,
    commit_hash: Option<String>,
    cached_at: Option<String>,
    #[serde(default)]
    size: u64,
}

/// A model recorded as cached in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedModel {
    pub model_id: String,
    pub cache_path: Option<String>,
    pub cached_at: Option<NaiveDateTime>,
    pub size: u64,
    pub commit_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_models: usize,
    pub total_size: u64,
    pub total_size_gb: f64,
    pub cache_dir: String,
    pub models: Vec<CachedModel>,
}

/// Index timestamps are written either without an offset or as RFC 3339
fn parse_cached_at(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Directory name of a model inside the cache, e.g. `Qwen--Qwen3-32B`
pub fn cache_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

/// Read-only view of a local model cache directory
#[derive(Debug, Clone)]
pub struct LocalModelCache {
    cache_dir: PathBuf,
    index: BTreeMap<String, CacheEntry>,
}

impl LocalModelCache {
    /// Open a cache directory; a missing or unreadable index means an empty cache
    pub fn open(cache_dir: &Path) -> Self {
        let index = match Self::read_index(cache_dir) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Could not load cache index: {:#}", e);
                BTreeMap::new()
            }
        };

        Self {
            cache_dir: cache_dir.to_path_buf(),
            index,
        }
    }

    fn read_index(cache_dir: &Path) -> Result<BTreeMap<String, CacheEntry>> {
        let index_path = cache_dir.join(CACHE_INDEX_FILE);
        if !index_path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = fs::read_to_string(&index_path)
            .with_context(|| format!("Failed to read {}", index_path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", index_path.display()))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn model_cache_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join("models").join(cache_dir_name(model_id))
    }

    pub fn list_cached(&self) -> Vec<CachedModel> {
        self.index
            .iter()
            .filter(|(_, entry)| entry.cached)
            .map(|(model_id, entry)| CachedModel {
                model_id: model_id.clone(),
                cache_path: entry.cache_path.clone(),
                cached_at: entry.cached_at.as_deref().and_then(parse_cached_at),
                size: entry.size,
                commit_hash: entry.commit_hash.clone(),
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let models = self.list_cached();
        let total_size: u64 = models.iter().map(|m| m.size).sum();

        CacheStats {
            total_models: models.len(),
            total_size,
            total_size_gb: total_size as f64 / (1024.0 * 1024.0 * 1024.0),
            cache_dir: self.cache_dir.display().to_string(),
            models,
        }
    }

    /// Cached models older than `days` at `now`; entries without a timestamp are skipped
    pub fn stale_models(&self, days: i64, now: NaiveDateTime) -> Vec<String> {
        let cutoff = now - Duration::days(days);
        self.list_cached()
            .into_iter()
            .filter(|m| m.cached_at.map_or(false, |at| at < cutoff))
            .map(|m| m.model_id)
            .collect()
    }
}

impl CacheAugmenter for LocalModelCache {
    fn is_cached(&self, model_id: &str) -> bool {
        self.index.get(model_id).map_or(false, |entry| entry.cached)
            && self.model_cache_path(model_id).exists()
    }

    fn environment_for(&self, model_id: &str) -> BTreeMap<String, String> {
        let cache_dir = self.cache_dir.display().to_string();
        let mut environment = BTreeMap::new();

        for var in ["HF_HOME", "TRANSFORMERS_CACHE", "HF_DATASETS_CACHE", "VLLM_CACHE_DIR"] {
            environment.insert(var.to_string(), cache_dir.clone());
        }
        environment.insert("HF_HUB_DISABLE_TELEMETRY".to_string(), "1".to_string());
        environment.insert(
            "PYTORCH_CUDA_ALLOC_CONF".to_string(),
            "max_split_size_mb:512".to_string(),
        );

        if self.is_cached(model_id) {
            environment.insert(
                "MODEL_CACHE_PATH".to_string(),
                self.model_cache_path(model_id).display().to_string(),
            );
        }

        environment
    }

    fn volumes_for(&self, model_id: &str) -> Vec<String> {
        let mut volumes = vec![format!(
            "{}:{}:ro",
            self.cache_dir.display(),
            CONTAINER_CACHE_DIR
        )];

        if self.is_cached(model_id) {
            volumes.push(format!(
                "{}:{}/{}:ro",
                self.model_cache_path(model_id).display(),
                CONTAINER_MODELS_DIR,
                cache_dir_name(model_id)
            ));
        }

        volumes
    }
}
