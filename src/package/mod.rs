//! The package aggregate and its on-disk layout.
//!
//! ```text
//! bare_package/            # directory, or the root of a .cap archive
//! ├── metadata.json        # name, version, description, dependencies (required)
//! ├── manifest.json        # content inventory (generated when absent)
//! ├── routes.json          # URL → file/dataset (generated when absent)
//! ├── storage.json         # dataset registry (generated when absent)
//! ├── content/             # servable files
//! └── data/                # dataset sources and schemas
//! ```
//!
//! Loading runs Metadata → Manifest → Storage → Routes, with route validation
//! last. Any failure aborts the load; there is no partially loaded package.
//!
//! A package loaded from a `.cap` archive is backed by a private scratch
//! extraction that is deleted when the package is dropped or disposed. A
//! package loaded from a directory works on that directory in place.

pub mod dataset;
pub mod manifest;
pub mod metadata;
pub mod routes;
pub mod storage;

use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;

use crate::archive::{self, ArchiveError};
use dataset::{DatasetConfig, DatasetError};
use manifest::{Manifest, ManifestError};
use metadata::{Metadata, MetadataError};
use routes::{Route, RouteError, RouteTarget, Routes};
use storage::Storage;

pub const METADATA_FILE: &str = "metadata.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const ROUTES_FILE: &str = "routes.json";
pub const STORAGE_FILE: &str = "storage.json";
pub const CONTENT_DIR: &str = "content";
pub const DATA_DIR: &str = "data";
pub const ARCHIVE_EXTENSION: &str = "cap";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid package path (expected a directory or a .cap file): {0}")]
    InvalidPath(PathBuf),
    #[error("Package already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Archive has no metadata.json: {0}")]
    ArchiveWithoutMetadata(PathBuf),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Where the package was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadType {
    Directory,
    Archive,
}

#[derive(Debug)]
pub struct Package {
    /// Path the caller passed to [`Package::load`].
    original_path: PathBuf,
    /// Directory holding the documents, `content/` and `data/`.
    root: PathBuf,
    load_type: LoadType,
    /// Scratch extraction owned by this package, if loaded from an archive.
    scratch: Option<TempDir>,
    metadata: Metadata,
    manifest: Manifest,
    storage: Storage,
    routes: Routes,
}

impl Package {
    /// Load a package from a directory or a `.cap` archive.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        Self::load_in(path, std::env::temp_dir())
    }

    /// Like [`Package::load`], with archive scratch directories created under
    /// `scratch_root` instead of the system temp directory.
    pub fn load_in(
        path: impl AsRef<Path>,
        scratch_root: impl AsRef<Path>,
    ) -> Result<Self, PackageError> {
        let path = path.as_ref();
        let original_path = std::path::absolute(path)?;

        if path.is_dir() {
            let root = original_path.clone();
            Self::open(original_path, root, LoadType::Directory, None)
        } else if path.is_file() && is_archive_path(path) {
            let scratch = tempfile::Builder::new()
                .prefix("capsium-")
                .tempdir_in(scratch_root)?;
            let root = extract_archive(path, scratch.path())?;
            tracing::debug!(
                archive = %path.display(),
                scratch = %root.display(),
                "extracted archive to scratch directory"
            );
            // On any failure below the scratch directory is dropped and removed.
            Self::open(original_path, root, LoadType::Archive, Some(scratch))
        } else {
            Err(PackageError::InvalidPath(path.to_path_buf()))
        }
    }

    fn open(
        original_path: PathBuf,
        root: PathBuf,
        load_type: LoadType,
        scratch: Option<TempDir>,
    ) -> Result<Self, PackageError> {
        let metadata = Metadata::load(&root.join(METADATA_FILE))?;
        let manifest = Manifest::load(&root.join(MANIFEST_FILE), &root.join(CONTENT_DIR))?;
        let storage = Storage::load(&root.join(STORAGE_FILE), &root.join(DATA_DIR))?;
        let routes = Routes::load(&root.join(ROUTES_FILE), &manifest, &storage)?;

        tracing::debug!(
            package = %metadata.package_id(),
            root = %root.display(),
            files = manifest.entries().len(),
            datasets = storage.datasets().len(),
            routes = routes.len(),
            "loaded package"
        );

        Ok(Self {
            original_path,
            root,
            load_type,
            scratch,
            metadata,
            manifest,
            storage,
            routes,
        })
    }

    /// Create the canonical layout for a new package in `dir` and load it.
    ///
    /// Writes `metadata.json`, an empty `data/`, and a starter
    /// `content/index.html` so the index route resolves.
    pub fn init(dir: impl AsRef<Path>, metadata: Metadata) -> Result<Self, PackageError> {
        let dir = dir.as_ref();
        metadata.validate()?;
        let metadata_path = dir.join(METADATA_FILE);
        if metadata_path.exists() {
            return Err(PackageError::AlreadyExists(dir.to_path_buf()));
        }

        fs::create_dir_all(dir.join(CONTENT_DIR))?;
        fs::create_dir_all(dir.join(DATA_DIR))?;
        let index = dir.join(CONTENT_DIR).join(routes::INDEX_FILE);
        if !index.exists() {
            fs::write(&index, starter_index(&metadata))?;
        }
        metadata.save(&metadata_path)?;

        Self::load(dir)
    }

    /// Write all four documents to the package root in canonical form.
    pub fn solidify(&self) -> Result<(), PackageError> {
        self.manifest.save(&self.root.join(MANIFEST_FILE))?;
        self.metadata.save(&self.root.join(METADATA_FILE))?;
        self.routes.save(&self.root.join(ROUTES_FILE))?;
        self.storage.save(&self.root.join(STORAGE_FILE))?;
        tracing::debug!(root = %self.root.display(), "solidified package");
        Ok(())
    }

    /// Re-run route validation and dataset schema validation.
    pub fn validate(&mut self) -> Result<(), PackageError> {
        self.routes.validate(&self.manifest, &self.storage)?;
        self.storage.validate()?;
        Ok(())
    }

    /// Release the package, deleting its scratch extraction if it has one.
    ///
    /// Dropping the package does the same but swallows deletion errors.
    pub fn dispose(self) -> Result<(), PackageError> {
        if let Some(scratch) = self.scratch {
            tracing::debug!(scratch = %scratch.path().display(), "removing scratch directory");
            scratch.close()?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(CONTENT_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Every file physically present under `content/`, sorted.
    pub fn content_files(&self) -> Result<Vec<PathBuf>, PackageError> {
        let content_dir = self.content_dir();
        if !content_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&content_dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PackageError::Manifest(e.into()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    pub fn add_route(&mut self, path: &str, target: RouteTarget) -> Result<&Route, PackageError> {
        Ok(self
            .routes
            .add(path, target, &self.manifest, &self.storage)?)
    }

    pub fn update_route(
        &mut self,
        path: &str,
        new_path: &str,
        new_target: RouteTarget,
    ) -> Result<&Route, PackageError> {
        Ok(self
            .routes
            .update(path, new_path, new_target, &self.manifest, &self.storage)?)
    }

    pub fn remove_route(&mut self, path: &str) -> Result<Route, PackageError> {
        Ok(self.routes.remove(path)?)
    }

    pub fn add_dataset(&mut self, config: DatasetConfig) -> Result<(), PackageError> {
        self.storage.add(config)?;
        Ok(())
    }
}

/// Whether `path` names a `.cap` archive (case-insensitive).
pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Extract into `<scratch>/<name>-<version>/`, named from the archived metadata.
fn extract_archive(archive_path: &Path, scratch: &Path) -> Result<PathBuf, PackageError> {
    let Some(bytes) = archive::read_entry(archive_path, METADATA_FILE)? else {
        return Err(PackageError::ArchiveWithoutMetadata(
            archive_path.to_path_buf(),
        ));
    };
    let metadata = Metadata::from_reader(bytes.as_slice())?;
    let root = scratch.join(metadata.package_id());
    archive::extract_all(archive_path, &root)?;
    Ok(root)
}

fn starter_index(metadata: &Metadata) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{name}</title></head>\n<body>\n<h1>{name}</h1>\n</body>\n</html>\n",
        name = metadata.name
    )
}

/// Serialize `value` as pretty JSON with a trailing newline.
pub(crate) fn write_document<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> std::io::Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json)
}

/// `path` relative to `base`, joined with `/`. `None` if not valid UTF-8.
pub(crate) fn slash_path(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Whether a relative path names something strictly below its base,
/// judged lexically: no absolute paths, no `..` climbing above the base.
pub(crate) fn is_contained_relative(relative: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}
