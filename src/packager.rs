//! Package ⇄ `.cap` archive transformation.
//!
//! # Packing
//!
//! ```text
//! package root ──copy──▶ scratch/<name>-<version>/ ──load + validate + solidify──┐
//!                                                                              │
//! output_dir/<name>-<version>.cap ◀──rename── output_dir/.capsium-*.partial ◀──zip
//! ```
//!
//! The live package is never touched: all regeneration happens on an
//! independent scratch copy, which is removed when packing finishes or fails.
//! The archive is written to a temporary file in the output directory and
//! renamed into place, so the destination path only ever holds a complete
//! archive.
//!
//! # Round trip
//!
//! Unpacking an archive and loading the result yields documents identical to
//! the ones written during packing, because the archive already carries the
//! solidified documents and loading adopts them as they are.
//!
//! No locking coordinates concurrent packers writing the same destination.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::archive::{self, ArchiveError};
use crate::package::{Package, PackageError};

#[derive(Error, Debug)]
pub enum PackError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive already exists, aborting (use --force to overwrite): {0}")]
    AlreadyExists(PathBuf),
    #[error("Failed to copy package: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Directory receiving `<name>-<version>.cap`.
    pub output_dir: PathBuf,
    /// Replace an existing archive instead of failing.
    pub force: bool,
    /// Parent of the scratch copy. Defaults to the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl PackOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            force: false,
            scratch_dir: None,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// Archive `package` and return the path of the written `.cap` file.
pub fn pack(package: &Package, options: &PackOptions) -> Result<PathBuf, PackError> {
    let metadata = package.metadata();
    let dest = options.output_dir.join(metadata.archive_name());

    if dest.exists() {
        if !options.force {
            return Err(PackError::AlreadyExists(dest));
        }
        tracing::warn!(archive = %dest.display(), "archive exists, overwriting");
        fs::remove_file(&dest)?;
    }
    fs::create_dir_all(&options.output_dir)?;

    let scratch_root = options
        .scratch_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    let scratch = tempfile::Builder::new()
        .prefix("capsium-pack-")
        .tempdir_in(scratch_root)?;
    let staging = scratch.path().join(metadata.package_id());
    let copied = copy_tree(package.root(), &staging)?;
    tracing::debug!(
        from = %package.root().display(),
        to = %staging.display(),
        files = copied,
        "staged package copy"
    );

    let mut staged = Package::load(&staging)?;
    staged.validate()?;
    staged.solidify()?;

    let mut partial = tempfile::Builder::new()
        .prefix(".capsium-")
        .suffix(".partial")
        .tempfile_in(&options.output_dir)?;
    let (_, entries) = archive::write_tree(staged.root(), partial.as_file_mut())?;
    partial.as_file().sync_all()?;

    let persisted = if options.force {
        partial.persist(&dest)
    } else {
        partial.persist_noclobber(&dest)
    };
    if let Err(e) = persisted {
        return Err(if e.error.kind() == io::ErrorKind::AlreadyExists {
            PackError::AlreadyExists(dest)
        } else {
            PackError::Io(e.error)
        });
    }

    tracing::debug!(archive = %dest.display(), entries, "package archived");
    staged.dispose()?;
    scratch.close()?;
    Ok(dest)
}

/// Extract every entry of `archive_path` into `dest`. Returns the entry count.
///
/// The extracted tree is not validated; load it as a [`Package`] for that.
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<usize, PackError> {
    let entries = archive::extract_all(archive_path, dest)?;
    tracing::debug!(
        archive = %archive_path.display(),
        dest = %dest.display(),
        entries,
        "archive unpacked"
    );
    Ok(entries)
}

/// SHA-256 of the archive file, as lowercase hex.
pub fn archive_digest(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Copy every file under `src` into `dst`, following symlinks.
fn copy_tree(src: &Path, dst: &Path) -> Result<usize, PackError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LoadType, MANIFEST_FILE, ROUTES_FILE};
    use crate::test_helpers::*;
    use tempfile::TempDir;

    #[test]
    fn pack_writes_named_archive() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let out = tmp.path().join("dist");

        let archive = pack(&package, &PackOptions::new(&out)).unwrap();
        assert_eq!(archive, out.join("bare_package-0.1.0.cap"));
        assert!(archive.is_file());
    }

    #[test]
    fn pack_leaves_live_package_untouched() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let before = read_tree(&dir);
        let package = Package::load(&dir).unwrap();

        pack(&package, &PackOptions::new(tmp.path().join("dist"))).unwrap();
        assert_eq!(read_tree(&dir), before);
        assert!(!dir.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn existing_archive_requires_force() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let out = tmp.path().join("dist");
        let options = PackOptions::new(&out);

        let archive = pack(&package, &options).unwrap();
        let result = pack(&package, &options);
        assert!(matches!(result, Err(PackError::AlreadyExists(p)) if p == archive));

        fs::write(&archive, "stale").unwrap();
        pack(&package, &options.clone().force(true)).unwrap();
        assert_ne!(fs::read(&archive).unwrap(), b"stale".to_vec());
    }

    #[test]
    fn no_partial_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let out = tmp.path().join("dist");
        pack(&package, &PackOptions::new(&out)).unwrap();

        let names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["bare_package-0.1.0.cap"]);
    }

    #[test]
    fn archive_contains_solidified_documents() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let archive = pack(&package, &PackOptions::new(tmp.path())).unwrap();

        let mut names = archive::entry_names(&archive).unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "content/example.css",
                "content/example.js",
                "content/index.html",
                "manifest.json",
                "metadata.json",
                "routes.json",
                "storage.json",
            ]
        );
    }

    #[test]
    fn unpack_reproduces_content_bytes() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let archive = pack(&package, &PackOptions::new(tmp.path().join("dist"))).unwrap();

        let dest = tmp.path().join("unpacked");
        unpack(&archive, &dest).unwrap();
        for file in ["index.html", "example.css", "example.js"] {
            assert_eq!(
                fs::read(dest.join("content").join(file)).unwrap(),
                fs::read(dir.join("content").join(file)).unwrap(),
                "{file} differs"
            );
        }
    }

    #[test]
    fn round_trip_documents_match_solidified_original() {
        let tmp = TempDir::new().unwrap();
        let dir = data_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let archive = pack(&package, &PackOptions::new(tmp.path().join("dist"))).unwrap();

        let dest = tmp.path().join("unpacked");
        unpack(&archive, &dest).unwrap();
        let reloaded = Package::load(&dest).unwrap();
        reloaded.solidify().unwrap();

        package.solidify().unwrap();
        assert_eq!(read_documents(&dest), read_documents(&dir));
        assert_eq!(
            fs::read(dest.join("data/animals.yaml")).unwrap(),
            fs::read(dir.join("data/animals.yaml")).unwrap()
        );
    }

    #[test]
    fn load_from_archive_uses_scratch_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let archive = pack(&package, &PackOptions::new(tmp.path().join("dist"))).unwrap();
        let archive_bytes = fs::read(&archive).unwrap();

        let loaded = Package::load(&archive).unwrap();
        assert_eq!(loaded.load_type(), LoadType::Archive);
        assert_ne!(loaded.root(), loaded.original_path());
        assert!(loaded.root().ends_with("bare_package-0.1.0"));
        assert_eq!(route_paths(&loaded), route_paths(&package));

        let scratch_root = loaded.root().to_path_buf();
        assert!(scratch_root.join(ROUTES_FILE).is_file());
        loaded.dispose().unwrap();
        assert!(!scratch_root.exists());
        assert_eq!(fs::read(&archive).unwrap(), archive_bytes);
    }

    #[test]
    fn disposing_directory_package_keeps_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        Package::load(&dir).unwrap().dispose().unwrap();
        assert!(dir.join("content/index.html").is_file());
    }

    #[test]
    fn pack_rejects_invalid_dataset() {
        let tmp = TempDir::new().unwrap();
        let dir = data_package(tmp.path());
        write_file(&dir.join("data/animals.yaml"), "animals:\n  - name: Lion\n");
        let package = Package::load(&dir).unwrap();
        let out = tmp.path().join("dist");

        let result = pack(&package, &PackOptions::new(&out));
        assert!(matches!(result, Err(PackError::Package(_))));
        assert!(!out.join("data_package-0.1.0.cap").exists());
    }

    fn leftover_scratch(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("capsium-"))
            .collect()
    }

    #[test]
    fn failed_pack_releases_scratch_copy() {
        let tmp = TempDir::new().unwrap();
        let dir = data_package(tmp.path());
        write_file(&dir.join("data/animals.yaml"), "animals:\n  - name: Lion\n");
        let package = Package::load(&dir).unwrap();
        let scratch = tmp.path().join("scratch");
        fs::create_dir(&scratch).unwrap();

        let options = PackOptions::new(tmp.path().join("dist")).scratch_dir(&scratch);
        assert!(matches!(pack(&package, &options), Err(PackError::Package(_))));
        assert_eq!(leftover_scratch(&scratch), Vec::<String>::new());
    }

    #[test]
    fn failed_archive_load_releases_scratch_extraction() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        write_file(
            &dir.join(ROUTES_FILE),
            r#"{"routes": [
                {"path": "/", "target": {"file": "index.html"}},
                {"path": "/ghost", "target": {"file": "ghost.html"}}
            ]}"#,
        );
        let bad = tmp.path().join("bad-0.1.0.cap");
        archive::write_tree(&dir, fs::File::create(&bad).unwrap()).unwrap();
        let scratch = tmp.path().join("scratch");
        fs::create_dir(&scratch).unwrap();

        let result = Package::load_in(&bad, &scratch);
        assert!(matches!(result, Err(PackageError::Route(_))));
        assert_eq!(leftover_scratch(&scratch), Vec::<String>::new());
    }

    #[test]
    fn pack_scratch_dir_is_empty_after_success() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        let package = Package::load(&dir).unwrap();
        let scratch = tmp.path().join("scratch");
        fs::create_dir(&scratch).unwrap();

        pack(
            &package,
            &PackOptions::new(tmp.path().join("dist")).scratch_dir(&scratch),
        )
        .unwrap();
        assert_eq!(leftover_scratch(&scratch), Vec::<String>::new());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_content_is_listed_and_archived() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        write_file(&dir.join("content/docs/notes.txt"), "notes");
        std::os::unix::fs::symlink("docs/notes.txt", dir.join("content/notes.txt")).unwrap();
        let package = Package::load(&dir).unwrap();
        assert!(package.manifest().lookup("notes.txt").is_some());
        assert!(package.routes().resolve("/notes.txt").is_some());

        let archive = pack(&package, &PackOptions::new(tmp.path().join("dist"))).unwrap();
        assert_eq!(
            archive::read_entry(&archive, "content/notes.txt").unwrap(),
            Some(b"notes".to_vec())
        );

        let dest = tmp.path().join("unpacked");
        unpack(&archive, &dest).unwrap();
        package.solidify().unwrap();
        assert_eq!(read_documents(&dest), read_documents(&dir));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_content_blocks_load() {
        let tmp = TempDir::new().unwrap();
        let dir = bare_package(tmp.path());
        write_file(&tmp.path().join("outside/secret.txt"), "secret");
        std::os::unix::fs::symlink(
            tmp.path().join("outside/secret.txt"),
            dir.join("content/notes.txt"),
        )
        .unwrap();

        match Package::load(&dir) {
            Err(PackageError::Route(crate::package::routes::RouteError::Validation {
                route,
                reason,
                ..
            })) => {
                assert_eq!(route, "/notes.txt");
                assert!(reason.contains("outside"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn digest_is_stable_hex() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            archive_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
