//! Dataset registry: `storage.json`.
//!
//! ```json
//! {
//!   "datasets": [
//!     { "name": "animals", "source": "animals.yaml", "format": "yaml", "schema": "animals_schema.yaml" }
//!   ]
//! }
//! ```
//!
//! Without a `storage.json`, the top level of `data/` is scanned for files with
//! a recognized extension. Each becomes a dataset named after its file stem,
//! except `X_schema.yaml` / `X_schema.json`, which become the schema of
//! dataset `X` when it exists. Unrecognized files are left alone.
//!
//! Dataset names are unique within a package.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::dataset::{
    Dataset, DatasetConfig, DatasetData, DatasetError, DatasetFormat, LoaderRegistry,
    RawDatasetConfig,
};
use super::write_document;

const SCHEMA_SUFFIX: &str = "_schema";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StorageDocument {
    #[serde(default)]
    datasets: Vec<RawDatasetConfig>,
}

#[derive(Serialize)]
struct StorageDocumentRef<'a> {
    datasets: Vec<&'a DatasetConfig>,
}

#[derive(Debug)]
pub struct Storage {
    data_dir: PathBuf,
    datasets: Vec<Dataset>,
    registry: LoaderRegistry,
}

impl Storage {
    pub fn load(storage_path: &Path, data_dir: &Path) -> Result<Self, DatasetError> {
        Self::load_with_registry(storage_path, data_dir, LoaderRegistry::standard())
    }

    pub fn load_with_registry(
        storage_path: &Path,
        data_dir: &Path,
        registry: LoaderRegistry,
    ) -> Result<Self, DatasetError> {
        let configs = if storage_path.is_file() {
            let document: StorageDocument =
                serde_json::from_str(&fs::read_to_string(storage_path)?)?;
            document
                .datasets
                .into_iter()
                .map(DatasetConfig::try_from)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            scan_data_dir(data_dir)?
        };

        let mut storage = Self {
            data_dir: data_dir.to_path_buf(),
            datasets: Vec::with_capacity(configs.len()),
            registry,
        };
        for config in configs {
            storage.add(config)?;
        }
        tracing::debug!(
            dir = %data_dir.display(),
            datasets = storage.datasets.len(),
            "loaded storage"
        );
        Ok(storage)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register a dataset. Names must be unique.
    pub fn add(&mut self, config: DatasetConfig) -> Result<&Dataset, DatasetError> {
        if self.contains(&config.name) {
            return Err(DatasetError::DuplicateName(config.name));
        }
        let dataset = Dataset::new(config, &self.data_dir)?;
        self.datasets.push(dataset);
        Ok(&self.datasets[self.datasets.len() - 1])
    }

    pub fn remove(&mut self, name: &str) -> Option<Dataset> {
        let index = self.datasets.iter().position(|d| d.name() == name)?;
        Some(self.datasets.remove(index))
    }

    /// Load (or return cached) data for the named dataset.
    pub fn load_data(&mut self, name: &str) -> Result<Option<&DatasetData>, DatasetError> {
        let registry = &self.registry;
        match self.datasets.iter_mut().find(|d| d.name() == name) {
            Some(dataset) => dataset.load_data(registry).map(Some),
            None => Ok(None),
        }
    }

    /// Validate every dataset that declares a schema.
    pub fn validate(&mut self) -> Result<(), DatasetError> {
        let registry = &self.registry;
        for dataset in self.datasets.iter_mut() {
            if dataset.schema_path().is_some() {
                dataset.validate(registry)?;
            }
        }
        Ok(())
    }

    /// Write `storage.json`, datasets sorted by name.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let mut datasets: Vec<&DatasetConfig> = self.datasets.iter().map(Dataset::config).collect();
        datasets.sort_by(|a, b| a.name.cmp(&b.name));
        write_document(path, &StorageDocumentRef { datasets })?;
        Ok(())
    }
}

/// Build configs for the recognized files at the top level of `data_dir`.
pub fn scan_data_dir(data_dir: &Path) -> Result<Vec<DatasetConfig>, DatasetError> {
    if !data_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.is_file() && DatasetFormat::from_path(&path).is_ok() {
            files.push(path);
        }
    }
    files.sort();

    // Only document datasets can carry a schema.
    let document_stems: BTreeSet<String> = files
        .iter()
        .filter(|p| is_document(p))
        .filter_map(|p| file_stem(p))
        .collect();
    let mut configs = Vec::new();

    for path in &files {
        let Some(stem) = file_stem(path) else {
            return Err(DatasetError::Unnamed(path.clone()));
        };
        let format = DatasetFormat::from_path(path)?;
        if is_document(path) && is_schema_for(&stem, &document_stems) {
            continue;
        }

        let schema = if is_document(path) {
            let schema_stem = format!("{stem}{SCHEMA_SUFFIX}");
            files
                .iter()
                .find(|candidate| {
                    is_document(candidate)
                        && file_stem(candidate).as_deref() == Some(schema_stem.as_str())
                })
                .and_then(|p| file_name(p))
        } else {
            None
        };

        let Some(source) = file_name(path) else {
            return Err(DatasetError::Unnamed(path.clone()));
        };
        configs.push(DatasetConfig {
            name: stem,
            source,
            format,
            schema,
        });
    }

    tracing::debug!(
        dir = %data_dir.display(),
        datasets = configs.len(),
        "generated storage from data directory"
    );
    Ok(configs)
}

/// `X_schema` next to a document dataset `X` is that dataset's schema.
fn is_schema_for(stem: &str, document_stems: &BTreeSet<String>) -> bool {
    stem.strip_suffix(SCHEMA_SUFFIX)
        .is_some_and(|base| !base.is_empty() && document_stems.contains(base))
}

fn is_document(path: &Path) -> bool {
    matches!(
        DatasetFormat::from_path(path),
        Ok(DatasetFormat::Yaml | DatasetFormat::Json)
    )
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|s| s.to_str()).map(String::from)
}
