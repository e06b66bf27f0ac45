//! Recipe resolution
//!
//! Combines the catalogs with a fresh hardware probe to pick a
//! (precision, GPU count, backend) slot. When the requested or auto-selected
//! combination has no enabled slot, the search falls back in a fixed order:
//!
//! 1. same precision, GPU counts 8, 4, 2, 1 (bounded by the runtime count)
//! 2. precisions bf16, fp16, fp8, each with GPU counts 8, 4, 2, 1
//!
//! The order never depends on directory enumeration, so identical inputs
//! always resolve identically.

pub mod heuristics;
pub mod request;

pub use request::{ResolutionRequest, ValidationError};

use crate::catalog::{CatalogError, ModelCatalog, RecipeCatalog, RecipeDefinition, Slot, SlotArgs};
use crate::hardware::{GpuProbe, ProbeResult};
use crate::types::{Backend, GpuCount, Precision, GPU_LADDER};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One (precision, GPU count) combination tried during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub precision: Precision,
    pub gpu_count: u32,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.gpu_count, self.precision)
    }
}

fn format_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "none".to_string();
    }
    attempts
        .iter()
        .map(Attempt::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no suitable recipe found for {model_id} (tried: {})", format_attempts(.attempts))]
    NotFound {
        model_id: String,
        attempts: Vec<Attempt>,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// The selected slot together with the hardware state it was chosen for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfiguration {
    pub recipe_id: String,
    pub model_id: String,
    pub gpu_count: GpuCount,
    pub precision: Precision,
    pub backend: Backend,
    pub slot: Slot,
    pub probe: ProbeResult,
    pub auto_selected_gpu_count: bool,
    pub auto_selected_precision: bool,
    /// Set when any part of the selected recipe asks for remote code
    pub requires_remote_code: bool,
}

impl ResolvedConfiguration {
    /// Launch arguments of the selected slot
    pub fn args(&self) -> Option<&SlotArgs> {
        self.slot.args()
    }

    /// Container name the launcher should use for this deployment
    pub fn container_name(&self) -> String {
        format!(
            "aim-engine-{}-{}gpu-{}-{}",
            self.model_id.replace('/', "-").to_lowercase(),
            self.gpu_count,
            self.precision,
            self.backend
        )
    }
}

/// Resolves requests against the model and recipe catalogs
pub struct RecipeResolver {
    models: ModelCatalog,
    recipes: RecipeCatalog,
    probe: Box<dyn GpuProbe>,
}

impl RecipeResolver {
    pub fn new(models: ModelCatalog, recipes: RecipeCatalog, probe: Box<dyn GpuProbe>) -> Self {
        Self {
            models,
            recipes,
            probe,
        }
    }

    pub fn models(&self) -> &ModelCatalog {
        &self.models
    }

    pub fn recipes(&self) -> &RecipeCatalog {
        &self.recipes
    }

    /// Select a slot for `request`
    pub fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<ResolvedConfiguration, ResolveError> {
        let model_id = request.model_id.as_str();
        let backend = request.backend;

        let probe = self.probe.probe();
        let runtime_gpus = if probe.runtime_visible < 1 {
            tracing::warn!("No GPUs visible to the serving runtime, assuming 1 GPU");
            1
        } else {
            probe.runtime_visible
        };

        let size_class = self.models.size_class(model_id);

        let gpu_count = match request.gpu_count {
            Some(requested) if requested.get() > runtime_gpus => {
                tracing::warn!(
                    "Requested {} GPUs but the runtime only sees {}, clamping",
                    requested,
                    runtime_gpus
                );
                runtime_gpus
            }
            Some(requested) => {
                tracing::info!("Using requested GPU count: {}", requested);
                requested.get()
            }
            None => {
                let count = heuristics::default_gpu_count(size_class, runtime_gpus);
                tracing::info!(
                    "Auto-selected GPU count: {} for {} model",
                    count,
                    size_class
                );
                count
            }
        };

        let precision = match request.precision {
            Some(precision) => {
                tracing::info!("Using requested precision: {}", precision);
                precision
            }
            None => {
                let precision = heuristics::default_precision(size_class);
                tracing::info!(
                    "Auto-selected precision: {} for {} model",
                    precision,
                    size_class
                );
                precision
            }
        };

        tracing::info!(
            "Resolving {} with {} GPU(s), {} precision, {} backend ({} GPU(s) visible to runtime)",
            model_id,
            gpu_count,
            precision,
            backend,
            runtime_gpus
        );

        let recipes = self.recipes.load_for_model(model_id)?;
        if recipes.is_empty() {
            return Err(ResolveError::NotFound {
                model_id: model_id.to_string(),
                attempts: Vec::new(),
            });
        }

        let mut search = SlotSearch {
            recipes: &recipes,
            backend,
            attempts: Vec::new(),
        };

        let found = search
            .try_slot(precision, gpu_count)
            .or_else(|| {
                tracing::warn!(
                    "No enabled {} slot for {} with {} GPU(s) at {}, trying other GPU counts",
                    backend,
                    model_id,
                    gpu_count,
                    precision
                );
                GPU_LADDER
                    .iter()
                    .copied()
                    .filter(|&g| g <= runtime_gpus && g != gpu_count)
                    .find_map(|g| search.try_slot(precision, g))
            })
            .or_else(|| {
                tracing::warn!("No enabled slot at {}, trying other precisions", precision);
                Precision::FALLBACK_LADDER
                    .iter()
                    .copied()
                    .filter(|&p| p != precision)
                    .find_map(|p| {
                        GPU_LADDER
                            .iter()
                            .copied()
                            .filter(|&g| g <= runtime_gpus)
                            .find_map(|g| search.try_slot(p, g))
                    })
            });

        let Some((recipe, found_gpus)) = found else {
            tracing::error!(
                "No suitable recipe found for {} with any supported configuration",
                model_id
            );
            return Err(ResolveError::NotFound {
                model_id: model_id.to_string(),
                attempts: search.attempts,
            });
        };

        if found_gpus.get() != gpu_count || recipe.precision != precision {
            tracing::info!(
                "Found alternative with {} GPU(s) at {}",
                found_gpus,
                recipe.precision
            );
        }
        tracing::info!("Selected recipe: {}", recipe.recipe_id);

        Ok(ResolvedConfiguration {
            recipe_id: recipe.recipe_id.clone(),
            model_id: model_id.to_string(),
            gpu_count: found_gpus,
            precision: recipe.precision,
            backend,
            slot: recipe.slot(backend, found_gpus).clone(),
            probe,
            auto_selected_gpu_count: request.gpu_count.is_none(),
            auto_selected_precision: request.precision.is_none(),
            requires_remote_code: recipe.requires_remote_code(),
        })
    }

    /// Whether `request` would resolve; catalog errors still propagate
    pub fn validate_recipe_exists(&self, request: &ResolutionRequest) -> Result<bool, ResolveError> {
        match self.resolve(request) {
            Ok(_) => Ok(true),
            Err(ResolveError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Slot lookups for one resolution, recording every combination tried
struct SlotSearch<'a> {
    recipes: &'a [RecipeDefinition],
    backend: Backend,
    attempts: Vec<Attempt>,
}

impl<'a> SlotSearch<'a> {
    fn try_slot(&mut self, precision: Precision, gpu_count: u32) -> Option<(&'a RecipeDefinition, GpuCount)> {
        self.attempts.push(Attempt {
            precision,
            gpu_count,
        });
        tracing::debug!("Trying {} GPU(s) at {}", gpu_count, precision);

        let gpus = GpuCount::new(gpu_count).ok()?;
        let recipes: &'a [RecipeDefinition] = self.recipes;
        recipes
            .iter()
            .find(|r| r.precision == precision && r.is_enabled(self.backend, gpus))
            .map(|r| (r, gpus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelDefinition;
    use crate::hardware::FixedProbe;

    fn resolver_without_recipes(runtime: u32) -> RecipeResolver {
        RecipeResolver::new(
            ModelCatalog::from_definitions(vec![ModelDefinition::new("Org/Model-7B", "7B")]),
            RecipeCatalog::new("/definitely/not/a/recipe/dir"),
            Box::new(FixedProbe(ProbeResult::uniform(runtime))),
        )
    }

    #[test]
    fn test_no_recipes_reports_empty_attempts() {
        let resolver = resolver_without_recipes(4);
        let request = ResolutionRequest::new("unknown/model", Backend::Vllm).unwrap();
        match resolver.resolve(&request) {
            Err(ResolveError::NotFound { attempts, .. }) => assert!(attempts.is_empty()),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(!resolver.validate_recipe_exists(&request).unwrap());
    }

    #[test]
    fn test_not_found_message_lists_attempts() {
        let err = ResolveError::NotFound {
            model_id: "A/B".to_string(),
            attempts: vec![
                Attempt {
                    precision: Precision::Bf16,
                    gpu_count: 4,
                },
                Attempt {
                    precision: Precision::Fp16,
                    gpu_count: 2,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "no suitable recipe found for A/B (tried: 4xbf16, 2xfp16)"
        );
    }
}
