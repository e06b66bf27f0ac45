//! Shared fixtures: on-disk catalogs in a temporary config directory

#![allow(dead_code)]

use aim_engine::catalog::{ModelCatalog, RecipeCatalog};
use aim_engine::hardware::{FixedProbe, ProbeResult};
use aim_engine::RecipeResolver;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub struct CatalogFixture {
    pub dir: TempDir,
}

impl CatalogFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("models")).unwrap();
        fs::create_dir_all(dir.path().join("recipes")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn add_model(&self, file: &str, id: &str, size: &str) -> &Self {
        let yaml = format!("huggingface_id: {}\nsize: {}\n", id, size);
        fs::write(self.path().join("models").join(file), yaml).unwrap();
        self
    }

    pub fn add_recipe(&self, file: &str, contents: &str) -> &Self {
        fs::write(self.path().join("recipes").join(file), contents).unwrap();
        self
    }

    pub fn resolver(&self, runtime_visible: u32) -> RecipeResolver {
        self.resolver_with_probe(ProbeResult::uniform(runtime_visible))
    }

    pub fn resolver_with_probe(&self, probe: ProbeResult) -> RecipeResolver {
        let models = ModelCatalog::load(&self.path().join("models")).unwrap();
        let recipes = RecipeCatalog::new(self.path().join("recipes"));
        RecipeResolver::new(models, recipes, Box::new(FixedProbe(probe)))
    }
}

/// Recipe YAML enabling `gpus` on one backend with a minimal argument set
pub fn recipe_yaml(recipe_id: &str, model_id: &str, precision: &str, backend: &str, gpus: &[u32]) -> String {
    let mut yaml = format!(
        "recipe_id: {}\nhuggingface_id: {}\nprecision: {}\n{}_serve:\n",
        recipe_id, model_id, precision, backend
    );
    for gpu in gpus {
        yaml.push_str(&format!(
            "  {gpu}_gpu:\n    enabled: true\n    args:\n      model: {model_id}\n      tensor-parallel-size: {gpu}\n"
        ));
    }
    yaml
}
