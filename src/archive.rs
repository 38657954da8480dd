//! Zip container I/O for `.cap` archives.
//!
//! Entry names are paths relative to the package root, `/`-separated, with no
//! leading slash. Extraction refuses entries that would land outside the
//! destination directory.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError};

use crate::package::slash_path;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Archive entry escapes the destination: {0}")]
    UnsafeEntry(String),
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

/// Add every file under `root` to a new zip written to `writer`.
///
/// Files are added in sorted path order. Returns the writer and the number of
/// entries written.
pub fn write_tree<W: Write + Seek>(root: &Path, writer: W) -> Result<(W, usize), ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut count = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = slash_path(entry.path(), root)
            .ok_or_else(|| ArchiveError::NonUtf8Path(entry.path().display().to_string()))?;
        zip.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        count += 1;
    }

    Ok((zip.finish()?, count))
}

/// Extract every entry of `archive_path` into `dest`, creating directories.
pub fn extract_all(archive_path: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    fs::create_dir_all(dest)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(archive.len())
}

/// Read one entry by name, or `None` if the archive has no such entry.
pub fn read_entry(archive_path: &Path, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Entry names in archive order.
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>, ArchiveError> {
    let archive = ZipArchive::new(File::open(archive_path)?)?;
    Ok(archive.file_names().map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    #[test]
    fn tree_written_with_relative_slash_names() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        write_file(&root.join("metadata.json"), "{}");
        write_file(&root.join("content/a/b.html"), "<p>b</p>");

        let archive_path = tmp.path().join("out.cap");
        let (_, count) = write_tree(&root, File::create(&archive_path).unwrap()).unwrap();
        assert_eq!(count, 2);

        let mut names = entry_names(&archive_path).unwrap();
        names.sort();
        assert_eq!(names, vec!["content/a/b.html", "metadata.json"]);
    }

    #[test]
    fn extract_reproduces_bytes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        write_file(&root.join("content/index.html"), "<html>héllo</html>");

        let archive_path = tmp.path().join("out.cap");
        write_tree(&root, File::create(&archive_path).unwrap()).unwrap();

        let dest = tmp.path().join("dest");
        assert_eq!(extract_all(&archive_path, &dest).unwrap(), 1);
        assert_eq!(
            fs::read(dest.join("content/index.html")).unwrap(),
            fs::read(root.join("content/index.html")).unwrap()
        );
    }

    #[test]
    fn read_entry_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        write_file(&root.join("metadata.json"), "{\"name\": \"x\"}");
        let archive_path = tmp.path().join("out.cap");
        write_tree(&root, File::create(&archive_path).unwrap()).unwrap();

        assert_eq!(
            read_entry(&archive_path, "metadata.json").unwrap().unwrap(),
            b"{\"name\": \"x\"}".to_vec()
        );
        assert!(read_entry(&archive_path, "routes.json").unwrap().is_none());
    }

    #[test]
    fn traversal_entry_rejected() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("evil.cap");
        {
            let mut zip = ZipWriter::new(File::create(&archive_path).unwrap());
            zip.start_file("../escape.txt", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"nope").unwrap();
            zip.finish().unwrap();
        }

        let dest = tmp.path().join("dest");
        let result = extract_all(&archive_path, &dest);
        assert!(matches!(result, Err(ArchiveError::UnsafeEntry(_))));
        assert!(!tmp.path().join("escape.txt").exists());
    }
}
