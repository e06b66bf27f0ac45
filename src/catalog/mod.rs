//! On-disk model and recipe catalogs
//!
//! A catalog directory holds one record per file. Records may be written as
//! YAML (`.yaml`, `.yml`) or JSON (`.json`); other files are ignored.

pub mod model;
pub mod recipe;

pub use model::{ModelCatalog, ModelDefinition};
pub use recipe::{RecipeCatalog, RecipeDefinition, Slot, SlotArgs, SupportedConfiguration};

use crate::types::{Backend, GpuCount, Precision};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog record {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("recipe {recipe_id} has invalid slot key '{key}' under {backend}, expected '<1-8>_gpu'")]
    InvalidSlotKey {
        recipe_id: String,
        backend: Backend,
        key: String,
    },

    #[error(
        "recipes {first} and {second} both enable {backend} at {gpu_count} GPU(s) with {precision} for {model_id}"
    )]
    DuplicateSlot {
        model_id: String,
        precision: Precision,
        backend: Backend,
        gpu_count: GpuCount,
        first: String,
        second: String,
    },
}

/// Supported record encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordFormat {
    Yaml,
    Json,
}

fn record_format(path: &Path) -> Option<RecordFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Some(RecordFormat::Yaml),
        Some("json") => Some(RecordFormat::Json),
        _ => None,
    }
}

/// Read and decode one catalog record
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let format = record_format(path).ok_or_else(|| CatalogError::Parse {
        path: path.to_path_buf(),
        message: "unsupported file extension".to_string(),
    })?;

    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = match format {
        RecordFormat::Yaml => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        RecordFormat::Json => serde_json::from_str(&contents).map_err(|e| e.to_string()),
    };

    parsed.map_err(|message| CatalogError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// List catalog record files in a directory, sorted by file name
///
/// A missing directory yields an empty list.
pub fn record_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    if !dir.exists() {
        tracing::warn!("Catalog directory not found: {}", dir.display());
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && record_format(&path).is_some() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        assert_eq!(record_format(Path::new("a.yaml")), Some(RecordFormat::Yaml));
        assert_eq!(record_format(Path::new("a.yml")), Some(RecordFormat::Yaml));
        assert_eq!(record_format(Path::new("a.json")), Some(RecordFormat::Json));
        assert_eq!(record_format(Path::new("README.md")), None);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let files = record_files(Path::new("/definitely/not/a/catalog")).unwrap();
        assert!(files.is_empty());
    }
}
