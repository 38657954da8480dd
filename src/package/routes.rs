//! URL routing table: `routes.json`.
//!
//! Each route maps a URL path to exactly one target, either a content file
//! registered in the manifest or a dataset registered in storage:
//!
//! ```json
//! {
//!   "routes": [
//!     { "path": "/", "target": { "file": "index.html" } },
//!     { "path": "/api/v1/data/animals", "target": { "dataset": "animals" } }
//!   ]
//! }
//! ```
//!
//! ## Generation
//!
//! Without a `routes.json`, routes are derived from the manifest in sorted
//! entry order:
//!
//! 1. The content-root `index.html` gets `/index` and the index route `/`.
//! 2. Every other `.html` file gets a clean route without the extension
//!    (`a/b.html` → `/a/b`).
//! 3. Every file gets its literal route (`/` + relative path).
//! 4. Every dataset gets an API route under [`DATASET_API_PREFIX`].
//!
//! When two steps produce the same path, the later one wins. Generation order
//! is fixed by the sorted manifest, so the outcome is deterministic.
//!
//! ## Validation
//!
//! File targets must be listed in the manifest, exist on disk, and stay inside
//! the content directory. Dataset targets must name a stored dataset. The
//! index route `/` must exist and point at an HTML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::manifest::Manifest;
use super::storage::Storage;
use super::{is_contained_relative, write_document};

pub const INDEX_ROUTE: &str = "/";
pub const INDEX_FILE: &str = "index.html";
pub const DATASET_API_PREFIX: &str = "/api/v1/data";

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid route {route} → {target}: {reason}")]
    Validation {
        route: String,
        target: String,
        reason: String,
    },
    #[error("Invalid index route: {0}")]
    IndexInvalid(String),
    #[error("Duplicate route path: {0}")]
    DuplicatePath(String),
    #[error("Route not found: {0}")]
    NotFound(String),
    #[error("Route path must start with '/': {0}")]
    InvalidPath(String),
}

/// What a route serves. Exactly one kind per route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteTarget {
    /// Content file, relative to `content/`.
    File(String),
    /// Dataset name.
    Dataset(String),
}

impl RouteTarget {
    pub fn file(file: impl Into<String>) -> Self {
        RouteTarget::File(file.into())
    }

    pub fn dataset(name: impl Into<String>) -> Self {
        RouteTarget::Dataset(name.into())
    }

    /// Filesystem path of a file target, resolved through the manifest.
    pub fn fs_path(&self, manifest: &Manifest) -> Option<PathBuf> {
        match self {
            RouteTarget::File(file) => manifest
                .lookup(file)
                .map(|entry| manifest.path_to_content_file(&entry.file)),
            RouteTarget::Dataset(_) => None,
        }
    }

    /// Media type of a file target, from its manifest entry.
    pub fn mime<'m>(&self, manifest: &'m Manifest) -> Option<&'m str> {
        match self {
            RouteTarget::File(file) => manifest.mime_for(file),
            RouteTarget::Dataset(_) => None,
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::File(file) => write!(f, "file:{file}"),
            RouteTarget::Dataset(name) => write!(f, "dataset:{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub target: RouteTarget,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutesDocument {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Serialize)]
struct RoutesDocumentRef<'a> {
    routes: Vec<&'a Route>,
}

/// Routes keyed by path; iteration is always in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routes {
    routes: BTreeMap<String, Route>,
}

impl Routes {
    /// Load `routes_path` if present, otherwise generate, then validate.
    pub fn load(
        routes_path: &Path,
        manifest: &Manifest,
        storage: &Storage,
    ) -> Result<Self, RouteError> {
        let routes = if routes_path.is_file() {
            let document: RoutesDocument = serde_json::from_str(&fs::read_to_string(routes_path)?)?;
            let mut routes = Routes::default();
            for route in document.routes {
                check_path(&route.path)?;
                if routes.routes.contains_key(&route.path) {
                    return Err(RouteError::DuplicatePath(route.path));
                }
                routes.routes.insert(route.path.clone(), route);
            }
            tracing::debug!(path = %routes_path.display(), routes = routes.len(), "loaded routes");
            routes
        } else {
            let routes = Routes::generate(manifest, storage);
            tracing::debug!(routes = routes.len(), "generated routes from manifest");
            routes
        };
        routes.validate(manifest, storage)?;
        Ok(routes)
    }

    /// Derive routes from the manifest and storage. Does not validate.
    pub fn generate(manifest: &Manifest, storage: &Storage) -> Self {
        let mut entries: Vec<&str> = manifest.entries().iter().map(|e| e.file.as_str()).collect();
        entries.sort_unstable();

        let mut routes = Routes::default();
        for file in entries {
            if file == INDEX_FILE {
                routes.insert_generated("/index".to_string(), RouteTarget::file(file));
                routes.insert_generated(INDEX_ROUTE.to_string(), RouteTarget::file(file));
            } else if let Some(stem) = html_stem(file) {
                routes.insert_generated(format!("/{stem}"), RouteTarget::file(file));
            }
            routes.insert_generated(format!("/{file}"), RouteTarget::file(file));
        }
        for dataset in storage.datasets() {
            routes.insert_generated(
                format!("{DATASET_API_PREFIX}/{}", dataset.name()),
                RouteTarget::dataset(dataset.name()),
            );
        }
        routes
    }

    fn insert_generated(&mut self, path: String, target: RouteTarget) {
        let route = Route {
            path: path.clone(),
            target: target.clone(),
        };
        if let Some(previous) = self.routes.insert(path, route)
            && previous.target != target
        {
            tracing::warn!(
                path = %previous.path,
                replaced = %previous.target,
                "generated route overwrites an earlier one"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Exact match on the URL path, no normalization.
    pub fn resolve(&self, url_path: &str) -> Option<&Route> {
        self.routes.get(url_path)
    }

    /// Check every target plus the index route.
    pub fn validate(&self, manifest: &Manifest, storage: &Storage) -> Result<(), RouteError> {
        validate_index(self.resolve(INDEX_ROUTE), manifest, storage)?;
        for route in self.routes.values() {
            validate_target(&route.path, &route.target, manifest, storage)?;
        }
        Ok(())
    }

    /// Add a new route after validating its target.
    pub fn add(
        &mut self,
        path: &str,
        target: RouteTarget,
        manifest: &Manifest,
        storage: &Storage,
    ) -> Result<&Route, RouteError> {
        check_path(path)?;
        if self.routes.contains_key(path) {
            return Err(RouteError::DuplicatePath(path.to_string()));
        }
        check_new_target(path, &target, manifest, storage)?;

        let route = Route {
            path: path.to_string(),
            target,
        };
        Ok(self.routes.entry(path.to_string()).or_insert(route))
    }

    /// Replace the route at `path` with `new_path` → `new_target`.
    pub fn update(
        &mut self,
        path: &str,
        new_path: &str,
        new_target: RouteTarget,
        manifest: &Manifest,
        storage: &Storage,
    ) -> Result<&Route, RouteError> {
        if !self.routes.contains_key(path) {
            return Err(RouteError::NotFound(path.to_string()));
        }
        check_path(new_path)?;
        if new_path != path && self.routes.contains_key(new_path) {
            return Err(RouteError::DuplicatePath(new_path.to_string()));
        }
        if path == INDEX_ROUTE && new_path != INDEX_ROUTE {
            return Err(RouteError::IndexInvalid(
                "the index route cannot be moved".to_string(),
            ));
        }
        check_new_target(new_path, &new_target, manifest, storage)?;

        self.routes.remove(path);
        let route = Route {
            path: new_path.to_string(),
            target: new_target,
        };
        Ok(self.routes.entry(new_path.to_string()).or_insert(route))
    }

    /// Remove and return the route at `path`. The index route stays.
    pub fn remove(&mut self, path: &str) -> Result<Route, RouteError> {
        if path == INDEX_ROUTE {
            return Err(RouteError::IndexInvalid(
                "the index route cannot be removed".to_string(),
            ));
        }
        self.routes
            .remove(path)
            .ok_or_else(|| RouteError::NotFound(path.to_string()))
    }

    /// Write `routes.json`, routes sorted by path.
    pub fn save(&self, path: &Path) -> Result<(), RouteError> {
        let routes = self.routes.values().collect();
        write_document(path, &RoutesDocumentRef { routes })?;
        Ok(())
    }
}

/// `a/b.html` → `Some("a/b")`; `None` for non-HTML files.
fn html_stem(file: &str) -> Option<&str> {
    let (stem, ext) = file.rsplit_once('.')?;
    let is_html = ext.eq_ignore_ascii_case("html");
    (is_html && !stem.is_empty() && !stem.ends_with('/')).then_some(stem)
}

fn check_path(path: &str) -> Result<(), RouteError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(RouteError::InvalidPath(path.to_string()))
    }
}

fn check_new_target(
    path: &str,
    target: &RouteTarget,
    manifest: &Manifest,
    storage: &Storage,
) -> Result<(), RouteError> {
    if path == INDEX_ROUTE {
        validate_index(
            Some(&Route {
                path: path.to_string(),
                target: target.clone(),
            }),
            manifest,
            storage,
        )
    } else {
        validate_target(path, target, manifest, storage)
    }
}

fn validate_index(
    route: Option<&Route>,
    manifest: &Manifest,
    storage: &Storage,
) -> Result<(), RouteError> {
    let Some(route) = route else {
        return Err(RouteError::IndexInvalid(format!(
            "no route for {INDEX_ROUTE}"
        )));
    };
    let RouteTarget::File(file) = &route.target else {
        return Err(RouteError::IndexInvalid(format!(
            "{INDEX_ROUTE} must target a file, not {}",
            route.target
        )));
    };
    validate_target(&route.path, &route.target, manifest, storage)
        .map_err(|e| RouteError::IndexInvalid(e.to_string()))?;

    let is_html = Path::new(file)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("html"));
    if !is_html {
        return Err(RouteError::IndexInvalid(format!(
            "{file} is not an HTML file"
        )));
    }
    Ok(())
}

fn validate_target(
    path: &str,
    target: &RouteTarget,
    manifest: &Manifest,
    storage: &Storage,
) -> Result<(), RouteError> {
    let invalid = |reason: &str| RouteError::Validation {
        route: path.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    };

    match target {
        RouteTarget::File(file) => {
            if manifest.lookup(file).is_none() {
                return Err(invalid("file is not listed in the manifest"));
            }
            if !is_contained_relative(file) {
                return Err(invalid("file is outside the content directory"));
            }
            if !manifest.content_file_exists(file) {
                return Err(invalid("file does not exist"));
            }
            // Lexical checks pass symlinks; compare resolved paths too.
            let resolved = manifest.path_to_content_file(file).canonicalize()?;
            let content_dir = manifest.content_dir().canonicalize()?;
            if !resolved.starts_with(&content_dir) {
                return Err(invalid("file is outside the content directory"));
            }
            Ok(())
        }
        RouteTarget::Dataset(name) => {
            if storage.contains(name) {
                Ok(())
            } else {
                Err(invalid("dataset is not registered in storage"))
            }
        }
    }
}
