use super::{read_record, record_files, CatalogError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn unknown_size() -> String {
    "unknown".to_string()
}

/// Model metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// HuggingFace-style identifier, e.g. `Qwen/Qwen3-32B`
    #[serde(alias = "huggingface_id")]
    pub id: String,
    /// Parameter size class such as `32B`
    #[serde(alias = "size", default = "unknown_size")]
    pub size_class: String,
}

impl ModelDefinition {
    pub fn new(id: impl Into<String>, size_class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            size_class: size_class.into(),
        }
    }
}

/// All model definitions, keyed by id
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelDefinition>,
}

impl ModelCatalog {
    /// Load every model record in `models_dir`
    ///
    /// Records that fail to parse or carry an id without a `/` are logged and
    /// skipped. When two records share an id the first file (by name) wins.
    pub fn load(models_dir: &Path) -> Result<Self, CatalogError> {
        let mut models = BTreeMap::new();

        for path in record_files(models_dir)? {
            let model: ModelDefinition = match read_record(&path) {
                Ok(model) => model,
                Err(e) => {
                    tracing::error!("Failed to load model {}: {}", path.display(), e);
                    continue;
                }
            };

            if !model.id.contains('/') {
                tracing::warn!(
                    "Skipping model record {}: id '{}' is not in 'org/model' form",
                    path.display(),
                    model.id
                );
                continue;
            }

            if models.contains_key(&model.id) {
                tracing::warn!(
                    "Duplicate model id {} in {}, keeping earlier record",
                    model.id,
                    path.display()
                );
                continue;
            }

            tracing::debug!("Loaded model: {}", model.id);
            models.insert(model.id.clone(), model);
        }

        Ok(Self { models })
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = ModelDefinition>) -> Self {
        let models = definitions
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        Self { models }
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelDefinition> {
        self.models.get(model_id)
    }

    /// Size class for a model, or `unknown` when it has no catalog entry
    pub fn size_class(&self, model_id: &str) -> &str {
        self.get(model_id)
            .map(|m| m.size_class.as_str())
            .unwrap_or("unknown")
    }

    pub fn list_models(&self) -> Vec<&ModelDefinition> {
        self.models.values().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_huggingface_field_names() {
        let yaml = "huggingface_id: Qwen/Qwen3-32B\nsize: 32B\nname: Qwen3 32B\n";
        let model: ModelDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(model.id, "Qwen/Qwen3-32B");
        assert_eq!(model.size_class, "32B");
    }

    #[test]
    fn test_size_class_defaults_to_unknown() {
        let model: ModelDefinition = serde_json::from_str(r#"{"id": "Org/Model"}"#).unwrap();
        assert_eq!(model.size_class, "unknown");

        let catalog = ModelCatalog::from_definitions(vec![model]);
        assert_eq!(catalog.size_class("Org/Model"), "unknown");
        assert_eq!(catalog.size_class("Other/Model"), "unknown");
    }
}
