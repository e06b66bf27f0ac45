//! Recipe records and the per-model recipe catalog

use super::{read_record, record_files, CatalogError};
use crate::types::{Backend, GpuCount, Precision};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Recipe text containing this marker needs remote code enabled
const TRUST_REMOTE_CODE_MARKER: &str = "trust-remote-code";

fn text_mentions_remote_code(text: &str) -> bool {
    text.to_lowercase().contains(TRUST_REMOTE_CODE_MARKER)
}

/// Launch arguments of a slot, in declared order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotArgs(Vec<(String, String)>);

impl SlotArgs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn mentions_remote_code(&self) -> bool {
        self.iter()
            .any(|(key, value)| text_mentions_remote_code(key) || text_mentions_remote_code(value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SlotArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Render a scalar record value the way it would appear on a command line
fn scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split a `--key value` / `--key=value` / `--flag` argument string; bare
/// flags get an empty value
fn split_arg(arg: &str) -> (String, String) {
    let arg = arg.trim();
    match arg.split_once(|c: char| c == '=' || c.is_whitespace()) {
        Some((key, value)) => (key.to_string(), value.trim().to_string()),
        None => (arg.to_string(), String::new()),
    }
}

struct SlotArgsVisitor;

impl<'de> Visitor<'de> for SlotArgsVisitor {
    type Value = SlotArgs;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of argument names to values or a list of argument strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut args = SlotArgs::new();
        while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
            if value.is_object() || value.is_array() {
                return Err(de::Error::custom(format!(
                    "argument '{}' must be a scalar value",
                    key
                )));
            }
            args.push(key, scalar_to_string(value));
        }
        Ok(args)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut args = SlotArgs::new();
        while let Some(arg) = seq.next_element::<String>()? {
            let (key, value) = split_arg(&arg);
            args.push(key, value);
        }
        Ok(args)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(SlotArgs::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(SlotArgs::new())
    }
}

impl<'de> Deserialize<'de> for SlotArgs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SlotArgsVisitor)
    }
}

impl Serialize for SlotArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One (backend, GPU count) entry of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "args", rename_all = "lowercase")]
pub enum Slot {
    Disabled,
    Enabled(SlotArgs),
}

impl Slot {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Slot::Enabled(_))
    }

    pub fn args(&self) -> Option<&SlotArgs> {
        match self {
            Slot::Enabled(args) => Some(args),
            Slot::Disabled => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SlotRecord {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    args: SlotArgs,
}

#[derive(Debug, Deserialize)]
struct RecipeRecord {
    recipe_id: String,
    #[serde(alias = "huggingface_id")]
    model_id: String,
    precision: Precision,
    #[serde(default)]
    vllm_serve: BTreeMap<String, SlotRecord>,
    #[serde(default)]
    sglang_serve: BTreeMap<String, SlotRecord>,
}

/// A validated (model, precision) pairing with its per-backend slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDefinition {
    pub recipe_id: String,
    pub model_id: String,
    pub precision: Precision,
    slots: BTreeMap<(Backend, GpuCount), Slot>,
    requires_remote_code: bool,
}

impl RecipeDefinition {
    pub fn new(
        recipe_id: impl Into<String>,
        model_id: impl Into<String>,
        precision: Precision,
    ) -> Self {
        let recipe_id = recipe_id.into();
        let model_id = model_id.into();
        Self {
            requires_remote_code: text_mentions_remote_code(&recipe_id)
                || text_mentions_remote_code(&model_id),
            recipe_id,
            model_id,
            precision,
            slots: BTreeMap::new(),
        }
    }

    /// Builder-style slot insertion, mostly for tests and programmatic catalogs
    pub fn with_slot(mut self, backend: Backend, gpu_count: GpuCount, slot: Slot) -> Self {
        if slot.args().map_or(false, SlotArgs::mentions_remote_code) {
            self.requires_remote_code = true;
        }
        self.slots.insert((backend, gpu_count), slot);
        self
    }

    /// Whether any part of the recipe, disabled slots included, asks for
    /// remote code
    pub fn requires_remote_code(&self) -> bool {
        self.requires_remote_code
    }

    /// Slot at `(backend, gpu_count)`; absent pairs are treated as disabled
    pub fn slot(&self, backend: Backend, gpu_count: GpuCount) -> &Slot {
        self.slots
            .get(&(backend, gpu_count))
            .unwrap_or(&Slot::Disabled)
    }

    pub fn is_enabled(&self, backend: Backend, gpu_count: GpuCount) -> bool {
        self.slot(backend, gpu_count).is_enabled()
    }

    /// All enabled slots, ordered by backend then GPU count
    pub fn enabled_slots(&self) -> impl Iterator<Item = (Backend, GpuCount, &SlotArgs)> {
        self.slots
            .iter()
            .filter_map(|(&(backend, gpu), slot)| slot.args().map(|args| (backend, gpu, args)))
    }

    fn from_record(record: RecipeRecord) -> Result<Self, CatalogError> {
        let mut recipe = Self::new(record.recipe_id, record.model_id, record.precision);

        let tables = [
            (Backend::Vllm, record.vllm_serve),
            (Backend::Sglang, record.sglang_serve),
        ];
        for (backend, table) in tables {
            for (key, slot) in table {
                if slot.args.mentions_remote_code() {
                    recipe.requires_remote_code = true;
                }
                let gpu_count =
                    GpuCount::from_slot_key(&key).ok_or_else(|| CatalogError::InvalidSlotKey {
                        recipe_id: recipe.recipe_id.clone(),
                        backend,
                        key: key.clone(),
                    })?;
                let slot = if slot.enabled {
                    Slot::Enabled(slot.args)
                } else {
                    Slot::Disabled
                };
                recipe.slots.insert((backend, gpu_count), slot);
            }
        }

        Ok(recipe)
    }
}

/// An enabled (recipe, precision, backend, GPU count) combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedConfiguration {
    pub recipe_id: String,
    pub precision: Precision,
    pub backend: Backend,
    pub gpu_count: GpuCount,
}

/// Lazily scanned recipe directory
#[derive(Debug, Clone)]
pub struct RecipeCatalog {
    recipes_dir: PathBuf,
}

impl RecipeCatalog {
    pub fn new(recipes_dir: impl Into<PathBuf>) -> Self {
        Self {
            recipes_dir: recipes_dir.into(),
        }
    }

    pub fn recipes_dir(&self) -> &Path {
        &self.recipes_dir
    }

    /// Parse every recipe file, skipping (and logging) the ones that fail
    fn load_all(&self) -> Result<Vec<RecipeDefinition>, CatalogError> {
        let mut recipes = Vec::new();

        for path in record_files(&self.recipes_dir)? {
            let parsed = read_record::<RecipeRecord>(&path).and_then(RecipeDefinition::from_record);
            match parsed {
                Ok(recipe) => recipes.push(recipe),
                Err(e) => tracing::error!("Failed to load recipe {}: {}", path.display(), e),
            }
        }

        Ok(recipes)
    }

    /// Load the recipes belonging to one model, in file-name order
    ///
    /// Fails when two recipes of the model enable the same
    /// (precision, backend, GPU count) slot.
    pub fn load_for_model(&self, model_id: &str) -> Result<Vec<RecipeDefinition>, CatalogError> {
        let recipes: Vec<RecipeDefinition> = self
            .load_all()?
            .into_iter()
            .filter(|r| r.model_id == model_id)
            .collect();

        for recipe in &recipes {
            tracing::debug!("Loaded recipe for {}: {}", model_id, recipe.recipe_id);
        }
        if recipes.is_empty() {
            tracing::warn!("No recipes found for model: {}", model_id);
        }

        check_duplicate_slots(model_id, &recipes)?;
        Ok(recipes)
    }

    pub fn recipe_ids(&self, model_id: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .load_for_model(model_id)?
            .into_iter()
            .map(|r| r.recipe_id)
            .collect())
    }

    /// Look a recipe up by id across every model
    pub fn find_recipe(&self, recipe_id: &str) -> Result<Option<RecipeDefinition>, CatalogError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|r| r.recipe_id == recipe_id))
    }

    /// Every enabled combination offered for a model
    pub fn supported_configurations(
        &self,
        model_id: &str,
    ) -> Result<Vec<SupportedConfiguration>, CatalogError> {
        let mut configurations: Vec<SupportedConfiguration> = self
            .load_for_model(model_id)?
            .iter()
            .flat_map(|recipe| {
                recipe
                    .enabled_slots()
                    .map(move |(backend, gpu_count, _)| SupportedConfiguration {
                        recipe_id: recipe.recipe_id.clone(),
                        precision: recipe.precision,
                        backend,
                        gpu_count,
                    })
            })
            .collect();

        configurations.sort_by(|a, b| {
            (a.backend, a.precision, a.gpu_count).cmp(&(b.backend, b.precision, b.gpu_count))
        });
        Ok(configurations)
    }
}

fn check_duplicate_slots(model_id: &str, recipes: &[RecipeDefinition]) -> Result<(), CatalogError> {
    let mut owners: BTreeMap<(Precision, Backend, GpuCount), &str> = BTreeMap::new();

    for recipe in recipes {
        for (backend, gpu_count, _) in recipe.enabled_slots() {
            let key = (recipe.precision, backend, gpu_count);
            if let Some(first) = owners.insert(key, &recipe.recipe_id) {
                return Err(CatalogError::DuplicateSlot {
                    model_id: model_id.to_string(),
                    precision: recipe.precision,
                    backend,
                    gpu_count,
                    first: first.to_string(),
                    second: recipe.recipe_id.clone(),
                });
            }
        }
    }

    Ok(())
}
