//! CLI command implementations

use super::GlobalArgs;
use aim_engine::catalog::{ModelCatalog, RecipeCatalog};
use aim_engine::config::{Config, ProbeConfig};
use aim_engine::hardware::{FixedProbe, GpuCapabilityProbe, GpuProbe, ProbeResult};
use aim_engine::synthesis::{CacheAugmenter, ConfigSynthesizer, LocalModelCache, NoCache};
use aim_engine::{RecipeResolver, ResolutionRequest};
use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

/// Build the effective config: file (or defaults), environment, then flags
pub fn load_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::from_env(),
    };

    if config.probe.visible_devices.is_none() {
        config.probe.visible_devices = ProbeConfig::from_env().visible_devices;
    }
    if let Some(dir) = &args.config_dir {
        config.paths.config_dir = dir.clone();
    }
    if let Some(dir) = &args.cache_dir {
        config.paths.cache_dir = dir.clone();
    }

    Ok(config)
}

fn build_probe(config: &Config, assume_gpus: Option<u32>) -> Box<dyn GpuProbe> {
    match assume_gpus {
        Some(count) => Box::new(FixedProbe(ProbeResult::uniform(count))),
        None => Box::new(GpuCapabilityProbe::new(&config.probe)),
    }
}

fn build_resolver(config: &Config, assume_gpus: Option<u32>) -> Result<RecipeResolver> {
    let models = ModelCatalog::load(&config.paths.models_dir())?;
    let recipes = RecipeCatalog::new(config.paths.recipes_dir());
    Ok(RecipeResolver::new(
        models,
        recipes,
        build_probe(config, assume_gpus),
    ))
}

#[allow(clippy::too_many_arguments)]
pub fn resolve(
    config: &Config,
    assume_gpus: Option<u32>,
    model: &str,
    gpu_count: Option<u32>,
    precision: Option<&str>,
    backend: &str,
    port: Option<u16>,
    no_cache: bool,
    docker: bool,
    output: Option<String>,
) -> Result<()> {
    // Reject bad input before touching hardware or catalogs
    let request = ResolutionRequest::parse(model, gpu_count, precision, backend)?;
    let port = port.unwrap_or(config.synthesis.port);

    let resolver = build_resolver(config, assume_gpus)?;
    let resolved = resolver.resolve(&request)?;

    let cache: Box<dyn CacheAugmenter> = if no_cache || !config.paths.use_cache {
        Box::new(NoCache)
    } else {
        Box::new(LocalModelCache::open(&config.paths.cache_path()))
    };
    let synthesized =
        ConfigSynthesizer::new().synthesize_with_cache(&resolved, port, cache.as_ref())?;

    let container_name = resolved.container_name();
    let mut result = json!({
        "resolved": resolved,
        "container_name": container_name,
        "port": port,
        "config": synthesized,
    });
    if docker {
        result["docker_args"] =
            json!(synthesized.docker_run_args(&config.synthesis.image, &container_name, port));
    }

    let rendered = serde_json::to_string_pretty(&result)?;
    println!("{}", rendered);

    if let Some(path) = output {
        std::fs::write(&path, &rendered)
            .with_context(|| format!("Failed to write result to {}", path))?;
        eprintln!("Saved configuration to {}", path);
    }

    Ok(())
}

pub fn models(config: &Config) -> Result<()> {
    let catalog = ModelCatalog::load(&config.paths.models_dir())?;

    if catalog.is_empty() {
        println!("No models found in {}", config.paths.models_dir().display());
        return Ok(());
    }

    println!("Models ({}):", catalog.len());
    for model in catalog.list_models() {
        println!("  {:<48} {}", model.id, model.size_class);
    }
    Ok(())
}

pub fn recipes(config: &Config, model: &str) -> Result<()> {
    let catalog = RecipeCatalog::new(config.paths.recipes_dir());
    let ids = catalog.recipe_ids(model)?;

    if ids.is_empty() {
        println!("No recipes found for {}", model);
        return Ok(());
    }

    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

pub fn configs(config: &Config, model: &str) -> Result<()> {
    let catalog = RecipeCatalog::new(config.paths.recipes_dir());
    let configurations = catalog.supported_configurations(model)?;
    println!("{}", serde_json::to_string_pretty(&configurations)?);
    Ok(())
}

pub fn probe(config: &Config, assume_gpus: Option<u32>) -> Result<()> {
    let result = build_probe(config, assume_gpus).probe();
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub fn cache(config: &Config, stale_days: Option<i64>) -> Result<()> {
    let cache = LocalModelCache::open(&config.paths.cache_path());
    let mut result = json!({ "stats": cache.stats() });
    if let Some(days) = stale_days {
        let now = chrono::Utc::now().naive_utc();
        result["stale_models"] = json!(cache.stale_models(days, now));
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
