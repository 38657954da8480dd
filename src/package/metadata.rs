//! Package identity: `metadata.json`.
//!
//! ```json
//! {
//!   "name": "bare_package",
//!   "version": "0.1.0",
//!   "description": "optional",
//!   "dependencies": [{ "name": "base_theme", "version": "1.2.0" }]
//! }
//! ```
//!
//! Metadata is the only mandatory document. The `(name, version)` pair
//! identifies the package and names its archive (`<name>-<version>.cap`).
//! Keys this crate does not know (an `encryption` block, say) are kept as
//! they are and written back on save.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::write_document;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Package metadata not found: {0}")]
    Missing(PathBuf),
    #[error("Invalid package metadata: {0}")]
    Invalid(String),
}

/// A package this one builds upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Unrecognised top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Metadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            dependencies: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Load `metadata.json`. Unlike the other documents, a missing file is an error.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        if !path.is_file() {
            return Err(MetadataError::Missing(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Parse metadata from any reader, e.g. an archive entry.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, MetadataError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_json(&text)
    }

    fn from_json(text: &str) -> Result<Self, MetadataError> {
        let metadata: Self = serde_json::from_str(text)?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::Invalid("name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(MetadataError::Invalid("version must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.version.contains(['/', '\\']) {
            return Err(MetadataError::Invalid(format!(
                "name and version must not contain path separators: {}-{}",
                self.name, self.version
            )));
        }
        Ok(())
    }

    /// `<name>-<version>`, used for archive names and extraction directories.
    pub fn package_id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.package_id(), super::ARCHIVE_EXTENSION)
    }

    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        write_document(path, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_minimal_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        fs::write(&path, r#"{"name": "test_package", "version": "0.1.0"}"#).unwrap();

        let metadata = Metadata::load(&path).unwrap();
        assert_eq!(metadata.name, "test_package");
        assert_eq!(metadata.version, "0.1.0");
        assert!(metadata.description.is_none());
        assert!(metadata.dependencies.is_empty());
    }

    #[test]
    fn load_with_dependencies_and_description() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        fs::write(
            &path,
            r#"{
                "name": "site",
                "version": "2.0.0",
                "description": "A site",
                "dependencies": [{"name": "theme", "version": "1.0.0"}]
            }"#,
        )
        .unwrap();

        let metadata = Metadata::load(&path).unwrap();
        assert_eq!(metadata.description.as_deref(), Some("A site"));
        assert_eq!(
            metadata.dependencies,
            vec![Dependency {
                name: "theme".into(),
                version: "1.0.0".into()
            }]
        );
    }

    #[test]
    fn unknown_keys_survive_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        fs::write(
            &path,
            r#"{
                "name": "site",
                "version": "1.0.0",
                "encryption": {"algorithm": "aes-256-gcm"}
            }"#,
        )
        .unwrap();

        let metadata = Metadata::load(&path).unwrap();
        assert_eq!(metadata.extra["encryption"]["algorithm"], "aes-256-gcm");

        let out = tmp.path().join("out.json");
        metadata.save(&out).unwrap();
        let reloaded = Metadata::load(&out).unwrap();
        assert_eq!(reloaded, metadata);
        assert!(fs::read_to_string(&out).unwrap().contains("\"encryption\""));
    }

    #[test]
    fn missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = Metadata::load(&tmp.path().join("metadata.json"));
        assert!(matches!(result, Err(MetadataError::Missing(_))));
    }

    #[test]
    fn empty_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        fs::write(&path, r#"{"name": "", "version": "0.1.0"}"#).unwrap();
        assert!(matches!(
            Metadata::load(&path),
            Err(MetadataError::Invalid(_))
        ));
    }

    #[test]
    fn archive_name_from_identity() {
        let metadata = Metadata::new("bare_package", "0.1.0");
        assert_eq!(metadata.archive_name(), "bare_package-0.1.0.cap");
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        let mut metadata = Metadata::new("site", "1.0.0");
        metadata.description = Some("desc".into());
        metadata.save(&path).unwrap();

        assert_eq!(Metadata::load(&path).unwrap(), metadata);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"dependencies\": []"));
        assert!(text.ends_with('\n'));
    }
}
