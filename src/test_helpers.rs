//! Shared test utilities for the capsium test suite.
//!
//! Fixture packages live under `fixtures/` and are copied into a caller-owned
//! temp directory, so tests can mutate them freely.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let dir = bare_package(tmp.path());
//! let package = Package::load(&dir).unwrap();
//!
//! assert_eq!(manifest_files(&package), vec!["example.css", "example.js", "index.html"]);
//! assert_eq!(route_paths(&package)[0], "/");
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::package::{MANIFEST_FILE, METADATA_FILE, Package, ROUTES_FILE, STORAGE_FILE};

// =========================================================================
// Fixture setup
// =========================================================================

pub const ANIMALS_YAML: &str = include_str!("../fixtures/data_package/data/animals.yaml");
pub const ANIMALS_SCHEMA_YAML: &str =
    include_str!("../fixtures/data_package/data/animals_schema.yaml");

/// Copy `fixtures/<name>/` to `parent/<name>/` and return the copy's path.
pub fn setup_fixture(parent: &Path, name: &str) -> PathBuf {
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name);
    let dest = parent.join(name);
    fs::create_dir_all(&dest).unwrap();
    copy_dir_recursive(&fixture, &dest).unwrap();
    dest
}

/// Three content files and a metadata document, nothing else.
pub fn bare_package(parent: &Path) -> PathBuf {
    setup_fixture(parent, "bare_package")
}

/// The bare content plus `data/animals.yaml` and its schema.
pub fn data_package(parent: &Path) -> PathBuf {
    setup_fixture(parent, "data_package")
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

// =========================================================================
// Bulk extractors
// =========================================================================

/// Manifest entry paths in manifest order.
pub fn manifest_files(package: &Package) -> Vec<String> {
    package
        .manifest()
        .entries()
        .iter()
        .map(|e| e.file.clone())
        .collect()
}

/// Route paths in canonical order.
pub fn route_paths(package: &Package) -> Vec<String> {
    package.routes().iter().map(|r| r.path.clone()).collect()
}

/// The four package documents as `(file name, text)`, missing ones skipped.
pub fn read_documents(dir: &Path) -> Vec<(String, String)> {
    [METADATA_FILE, MANIFEST_FILE, ROUTES_FILE, STORAGE_FILE]
        .into_iter()
        .filter_map(|name| {
            fs::read_to_string(dir.join(name))
                .ok()
                .map(|text| (name.to_string(), text))
        })
        .collect()
}

/// Every file under `dir` keyed by relative path, for before/after comparisons.
pub fn read_tree(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}
