//! Content inventory: `manifest.json`.
//!
//! Every servable file under `content/` gets one entry with its path relative
//! to `content/` and a media type guessed from the filename alone:
//!
//! ```json
//! {
//!   "content": [
//!     { "file": "example.css", "mime": "text/css" },
//!     { "file": "index.html", "mime": "text/html" }
//!   ]
//! }
//! ```
//!
//! When `manifest.json` exists it is adopted verbatim, with no re-check
//! against the disk. Otherwise the content directory is walked and entries are
//! generated in sorted order, so two scans of an unchanged tree are identical.
//! Missing files surface later, when routes resolve their targets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use super::{slash_path, write_document};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Duplicate manifest entry: {0}")]
    DuplicateEntry(String),
    #[error("Content path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to `content/`, forward-slash separated.
    pub file: String,
    pub mime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ManifestDocument {
    content: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    content_dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load `manifest_path` if present, otherwise scan `content_dir`.
    pub fn load(manifest_path: &Path, content_dir: &Path) -> Result<Self, ManifestError> {
        let entries = if manifest_path.is_file() {
            let document: ManifestDocument =
                serde_json::from_str(&fs::read_to_string(manifest_path)?)?;
            tracing::debug!(
                path = %manifest_path.display(),
                entries = document.content.len(),
                "loaded manifest"
            );
            document.content
        } else {
            let entries = scan_content(content_dir)?;
            tracing::debug!(
                dir = %content_dir.display(),
                entries = entries.len(),
                "generated manifest from content directory"
            );
            entries
        };

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.file.as_str()) {
                return Err(ManifestError::DuplicateEntry(entry.file.clone()));
            }
        }

        Ok(Self {
            content_dir: content_dir.to_path_buf(),
            entries,
        })
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Entries in load order. Generated manifests are already sorted.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Exact match on the relative path.
    pub fn lookup(&self, file: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.file == file)
    }

    pub fn mime_for(&self, file: &str) -> Option<&str> {
        self.lookup(file).map(|e| e.mime.as_str())
    }

    /// Join a relative content path onto the content directory. No checks.
    pub fn path_to_content_file(&self, file: &str) -> PathBuf {
        self.content_dir.join(file)
    }

    /// Whether `file` exists on disk, regardless of manifest entries.
    pub fn content_file_exists(&self, file: &str) -> bool {
        self.path_to_content_file(file).is_file()
    }

    /// Write `manifest.json` with entries sorted by `file`.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let mut content = self.entries.clone();
        content.sort_by(|a, b| a.file.cmp(&b.file));
        write_document(path, &ManifestDocument { content })?;
        Ok(())
    }
}

/// Walk `content_dir` recursively and build sorted entries for every file.
///
/// Symlinks are followed, matching what `pack` copies into the archive. A
/// link that resolves outside `content/` is listed here and then rejected by
/// route validation. A missing content directory yields an empty manifest.
pub fn scan_content(content_dir: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    if !content_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(content_dir)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = slash_path(entry.path(), content_dir)
            .ok_or_else(|| ManifestError::NonUtf8Path(entry.path().to_path_buf()))?;
        let mime = mime_from_path(entry.path());
        entries.push(ManifestEntry { file, mime });
    }
    // Walk order is per-directory; the manifest is ordered by full path string.
    entries.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(entries)
}

/// Media type from the filename extension only; content is never sniffed.
pub fn mime_from_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn content_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let content = tmp.path().join("content");
        write_file(&content.join("index.html"), "<html></html>");
        write_file(&content.join("example.css"), "body {}");
        write_file(&content.join("a/b.html"), "<p>b</p>");
        write_file(&content.join("a-z.txt"), "dash sorts before slash");
        tmp
    }

    #[test]
    fn generated_entries_are_sorted_by_path() {
        let tmp = content_tree();
        let content = tmp.path().join("content");
        let manifest = Manifest::load(&tmp.path().join("manifest.json"), &content).unwrap();

        let files: Vec<&str> = manifest.entries().iter().map(|e| e.file.as_str()).collect();
        assert_eq!(files, vec!["a-z.txt", "a/b.html", "example.css", "index.html"]);
    }

    #[test]
    fn generation_is_deterministic() {
        let tmp = content_tree();
        let content = tmp.path().join("content");
        let first = scan_content(&content).unwrap();
        let second = scan_content(&content).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mime_detected_from_extension() {
        let tmp = content_tree();
        let content = tmp.path().join("content");
        let manifest = Manifest::load(&tmp.path().join("manifest.json"), &content).unwrap();
        assert_eq!(manifest.mime_for("index.html"), Some("text/html"));
        assert_eq!(manifest.mime_for("example.css"), Some("text/css"));
        assert_eq!(manifest.mime_for("a-z.txt"), Some("text/plain"));
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(
            mime_from_path(Path::new("blob.zzzunknown")),
            "application/octet-stream"
        );
    }

    #[test]
    fn existing_document_adopted_verbatim() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"content": [
                {"file": "z.html", "mime": "text/html"},
                {"file": "ghost.js", "mime": "text/javascript"}
            ]}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path, &tmp.path().join("content")).unwrap();
        assert_eq!(manifest.entries().len(), 2);
        assert_eq!(manifest.entries()[0].file, "z.html");
        assert_eq!(manifest.mime_for("ghost.js"), Some("text/javascript"));
        assert!(!manifest.content_file_exists("ghost.js"));
    }

    #[test]
    fn lookup_is_exact_match() {
        let tmp = content_tree();
        let content = tmp.path().join("content");
        let manifest = Manifest::load(&tmp.path().join("manifest.json"), &content).unwrap();
        assert!(manifest.lookup("a/b.html").is_some());
        assert!(manifest.lookup("/a/b.html").is_none());
        assert!(manifest.lookup("b.html").is_none());
    }

    #[test]
    fn duplicate_entries_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"content": [
                {"file": "a.html", "mime": "text/html"},
                {"file": "a.html", "mime": "text/html"}
            ]}"#,
        )
        .unwrap();
        let result = Manifest::load(&path, &tmp.path().join("content"));
        assert!(matches!(result, Err(ManifestError::DuplicateEntry(f)) if f == "a.html"));
    }

    #[test]
    fn save_sorts_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"content": [
                {"file": "z.html", "mime": "text/html"},
                {"file": "a.css", "mime": "text/css"}
            ]}"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path, &tmp.path().join("content")).unwrap();
        let out = tmp.path().join("out.json");
        manifest.save(&out).unwrap();

        let saved = fs::read_to_string(&out).unwrap();
        assert!(saved.find("a.css").unwrap() < saved.find("z.html").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_listed() {
        let tmp = content_tree();
        let content = tmp.path().join("content");
        write_file(&tmp.path().join("outside/secret.txt"), "secret");
        std::os::unix::fs::symlink(
            tmp.path().join("outside/secret.txt"),
            content.join("notes.txt"),
        )
        .unwrap();
        std::os::unix::fs::symlink(content.join("a"), content.join("linked")).unwrap();

        let files: Vec<String> = scan_content(&content)
            .unwrap()
            .into_iter()
            .map(|e| e.file)
            .collect();
        assert!(files.contains(&"notes.txt".to_string()));
        assert!(files.contains(&"linked/b.html".to_string()));
    }

    #[test]
    fn missing_content_dir_is_empty_manifest() {
        let tmp = TempDir::new().unwrap();
        let manifest =
            Manifest::load(&tmp.path().join("manifest.json"), &tmp.path().join("content")).unwrap();
        assert!(manifest.entries().is_empty());
    }
}
