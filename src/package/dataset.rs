//! Structured datasets and their format loaders.
//!
//! A dataset is a named source file under `data/` in one of five formats:
//!
//! | Format | Extensions | Loaded as | Schema validation |
//! |--------|------------|-----------|-------------------|
//! | `yaml` | `.yaml`, `.yml` | document tree | yes |
//! | `json` | `.json` | document tree | yes |
//! | `csv` | `.csv` | header + rows | no |
//! | `tsv` | `.tsv` | header + rows | no |
//! | `sqlite` | `.sqlite`, `.db` | table → rows | no |
//!
//! Loading is dispatched through a [`LoaderRegistry`] keyed by
//! [`DatasetFormat`]; adding a format means registering another
//! [`FormatLoader`], not growing a `match`.
//!
//! The persisted form of a dataset is its [`DatasetConfig`], never the data
//! itself. The source file stays the single copy of the content.

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Unsupported dataset format: {0}")]
    UnsupportedFormat(String),
    #[error("Dataset '{dataset}' has format {format}, which does not support schema validation")]
    UnsupportedValidation {
        dataset: String,
        format: DatasetFormat,
    },
    #[error("Invalid schema for dataset '{dataset}': {message}")]
    InvalidSchema { dataset: String, message: String },
    #[error("Dataset '{dataset}' failed schema validation: {}", format_violations(.violations))]
    SchemaValidation {
        dataset: String,
        violations: Vec<SchemaViolation>,
    },
    #[error("Dataset '{dataset}' path escapes the data directory: {path}")]
    OutsideDataDir { dataset: String, path: String },
    #[error("Duplicate dataset name: {0}")]
    DuplicateName(String),
    #[error("Dataset file has no usable name: {0}")]
    Unnamed(PathBuf),
}

/// One failed JSON-Schema constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer into the data, e.g. `/animals/1`.
    pub path: String,
    /// The violated rule, e.g. `"type" is a required property`.
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetFormat {
    Yaml,
    Json,
    Csv,
    Tsv,
    Sqlite,
}

impl DatasetFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetFormat::Yaml => "yaml",
            DatasetFormat::Json => "json",
            DatasetFormat::Csv => "csv",
            DatasetFormat::Tsv => "tsv",
            DatasetFormat::Sqlite => "sqlite",
        }
    }

    /// Detect the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        ext.parse()
    }
}

impl FromStr for DatasetFormat {
    type Err = DatasetError;

    /// Accepts format names and their file extension aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(DatasetFormat::Yaml),
            "json" => Ok(DatasetFormat::Json),
            "csv" => Ok(DatasetFormat::Csv),
            "tsv" => Ok(DatasetFormat::Tsv),
            "sqlite" | "db" => Ok(DatasetFormat::Sqlite),
            _ => Err(DatasetError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DatasetFormat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Config
// ============================================================================

/// Persisted description of a dataset, one entry of `storage.json`.
///
/// `source` and `schema` are relative to the package's `data/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetConfig {
    pub name: String,
    pub source: String,
    pub format: DatasetFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// `storage.json` entry as written on disk, before the format is checked.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDatasetConfig {
    name: String,
    source: String,
    format: String,
    #[serde(default)]
    schema: Option<String>,
}

impl TryFrom<RawDatasetConfig> for DatasetConfig {
    type Error = DatasetError;

    fn try_from(raw: RawDatasetConfig) -> Result<Self, Self::Error> {
        Ok(DatasetConfig {
            format: raw.format.parse()?,
            name: raw.name,
            source: raw.source,
            schema: raw.schema,
        })
    }
}

// ============================================================================
// Data
// ============================================================================

/// Rows read from a delimited file, with the header row as field names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Value of `column` in row `row`, by header name.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetData {
    /// A parsed YAML or JSON document.
    Document(serde_json::Value),
    /// CSV/TSV rows.
    Table(Table),
    /// SQLite table name → rows, each row an ordered list of column values.
    Tables(BTreeMap<String, Vec<Vec<serde_json::Value>>>),
}

// ============================================================================
// Loaders
// ============================================================================

/// Reads one dataset format from disk.
pub trait FormatLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<DatasetData, DatasetError>;

    /// Whether loaded data can be checked against a JSON Schema.
    fn supports_validation(&self) -> bool {
        false
    }
}

pub struct YamlLoader;

impl FormatLoader for YamlLoader {
    fn load(&self, path: &Path) -> Result<DatasetData, DatasetError> {
        let value: serde_json::Value = serde_yaml::from_reader(File::open(path)?)?;
        Ok(DatasetData::Document(value))
    }

    fn supports_validation(&self) -> bool {
        true
    }
}

pub struct JsonLoader;

impl FormatLoader for JsonLoader {
    fn load(&self, path: &Path) -> Result<DatasetData, DatasetError> {
        let value: serde_json::Value = serde_json::from_reader(File::open(path)?)?;
        Ok(DatasetData::Document(value))
    }

    fn supports_validation(&self) -> bool {
        true
    }
}

/// CSV and TSV differ only in the delimiter.
pub struct DelimitedLoader {
    pub delimiter: u8,
}

impl FormatLoader for DelimitedLoader {
    fn load(&self, path: &Path) -> Result<DatasetData, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(String::from).collect());
        }
        Ok(DatasetData::Table(Table { headers, rows }))
    }
}

pub struct SqliteLoader;

impl FormatLoader for SqliteLoader {
    fn load(&self, path: &Path) -> Result<DatasetData, DatasetError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let table_names: Vec<String> = {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            names
        };

        let mut tables = BTreeMap::new();
        for name in table_names {
            let sql = format!("SELECT * FROM \"{}\"", name.replace('"', "\"\""));
            let mut stmt = conn.prepare(&sql)?;
            let columns = stmt.column_count();
            let rows = stmt
                .query_map([], |row| {
                    (0..columns)
                        .map(|i| row.get::<_, rusqlite::types::Value>(i).map(sql_to_json))
                        .collect::<Result<Vec<_>, _>>()
                })?
                .collect::<Result<Vec<_>, _>>()?;
            tables.insert(name, rows);
        }
        Ok(DatasetData::Tables(tables))
    }
}

fn sql_to_json(value: rusqlite::types::Value) -> serde_json::Value {
    use rusqlite::types::Value;
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => i.into(),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => s.into(),
        Value::Blob(bytes) => bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .into(),
    }
}

/// Format → loader table.
pub struct LoaderRegistry {
    loaders: HashMap<DatasetFormat, Box<dyn FormatLoader>>,
}

impl LoaderRegistry {
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Loaders for every built-in format.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(DatasetFormat::Yaml, YamlLoader);
        registry.register(DatasetFormat::Json, JsonLoader);
        registry.register(DatasetFormat::Csv, DelimitedLoader { delimiter: b',' });
        registry.register(DatasetFormat::Tsv, DelimitedLoader { delimiter: b'\t' });
        registry.register(DatasetFormat::Sqlite, SqliteLoader);
        registry
    }

    /// Add or replace the loader for `format`.
    pub fn register(&mut self, format: DatasetFormat, loader: impl FormatLoader + 'static) {
        self.loaders.insert(format, Box::new(loader));
    }

    pub fn get(&self, format: DatasetFormat) -> Result<&dyn FormatLoader, DatasetError> {
        self.loaders
            .get(&format)
            .map(|l| l.as_ref())
            .ok_or_else(|| DatasetError::UnsupportedFormat(format.to_string()))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<_> = self.loaders.keys().collect();
        formats.sort();
        f.debug_struct("LoaderRegistry")
            .field("formats", &formats)
            .finish()
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// A dataset config bound to a data directory, with lazily loaded data.
#[derive(Debug, Clone)]
pub struct Dataset {
    config: DatasetConfig,
    source_path: PathBuf,
    schema_path: Option<PathBuf>,
    data: Option<DatasetData>,
}

impl Dataset {
    /// Bind `config` to `data_dir`. Paths must stay inside `data_dir`.
    pub fn new(config: DatasetConfig, data_dir: &Path) -> Result<Self, DatasetError> {
        let source_path = resolve_in(data_dir, &config.name, &config.source)?;
        let schema_path = config
            .schema
            .as_deref()
            .map(|schema| resolve_in(data_dir, &config.name, schema))
            .transpose()?;
        Ok(Self {
            config,
            source_path,
            schema_path,
            data: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn format(&self) -> DatasetFormat {
        self.config.format
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn schema_path(&self) -> Option<&Path> {
        self.schema_path.as_deref()
    }

    /// Data loaded so far, if any.
    pub fn data(&self) -> Option<&DatasetData> {
        self.data.as_ref()
    }

    /// Parse the source file on first call; later calls return the cached data.
    pub fn load_data(&mut self, registry: &LoaderRegistry) -> Result<&DatasetData, DatasetError> {
        let data = match self.data.take() {
            Some(data) => data,
            None => {
                let loader = registry.get(self.config.format)?;
                let data = loader.load(&self.source_path)?;
                tracing::debug!(dataset = %self.config.name, format = %self.config.format, "loaded dataset");
                data
            }
        };
        Ok(self.data.insert(data))
    }

    /// Check the data against the declared JSON Schema.
    ///
    /// Only document formats can be validated; a dataset without a schema
    /// passes trivially.
    pub fn validate(&mut self, registry: &LoaderRegistry) -> Result<(), DatasetError> {
        if !registry.get(self.config.format)?.supports_validation() {
            return Err(DatasetError::UnsupportedValidation {
                dataset: self.config.name.clone(),
                format: self.config.format,
            });
        }
        let Some(schema_path) = self.schema_path.clone() else {
            return Ok(());
        };

        let schema = match load_schema(registry, &schema_path)? {
            DatasetData::Document(value) => value,
            _ => {
                return Err(DatasetError::InvalidSchema {
                    dataset: self.config.name.clone(),
                    message: format!("{} is not a document", schema_path.display()),
                });
            }
        };
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| DatasetError::InvalidSchema {
                dataset: self.config.name.clone(),
                message: e.to_string(),
            })?;

        let name = self.config.name.clone();
        let format = self.config.format;
        let DatasetData::Document(instance) = self.load_data(registry)? else {
            return Err(DatasetError::UnsupportedValidation {
                dataset: name,
                format,
            });
        };
        let violations: Vec<SchemaViolation> = validator
            .iter_errors(instance)
            .map(|e| SchemaViolation {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(DatasetError::SchemaValidation {
                dataset: name,
                violations,
            })
        }
    }
}

/// Schemas are YAML or JSON documents, picked by their own extension.
fn load_schema(registry: &LoaderRegistry, path: &Path) -> Result<DatasetData, DatasetError> {
    let format = DatasetFormat::from_path(path)?;
    let loader = registry.get(format)?;
    if !loader.supports_validation() {
        return Err(DatasetError::UnsupportedFormat(format!(
            "{} (schema must be yaml or json)",
            format
        )));
    }
    loader.load(path)
}

fn resolve_in(data_dir: &Path, dataset: &str, relative: &str) -> Result<PathBuf, DatasetError> {
    if !super::is_contained_relative(relative) {
        return Err(DatasetError::OutsideDataDir {
            dataset: dataset.to_string(),
            path: relative.to_string(),
        });
    }
    Ok(data_dir.join(relative))
}
