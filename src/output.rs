//! CLI output formatting for package inspection and packing.
//!
//! # Information-First Display
//!
//! Each entity (content file, dataset, route) leads with its identity, with
//! filesystem detail shown as secondary context on indented lines. The output
//! reads as an inventory of the package while still letting users trace an
//! entry back to a file.
//!
//! # Output Format
//!
//! ## Info
//!
//! ```text
//! data_package 0.1.0
//!     Description: Static site with a validated animals dataset
//!     Source: /work/data_package (directory)
//!
//! Content (3 files)
//! 001 example.css
//!     Type: text/css
//!
//! Datasets (1)
//! 001 animals
//!     Source: animals.yaml (yaml)
//!     Schema: animals_schema.yaml
//!
//! Routes (6)
//! / → file:index.html
//! /api/v1/data/animals → dataset:animals
//! ```
//!
//! ## Pack
//!
//! ```text
//! Packed data_package 0.1.0 → dist/data_package-0.1.0.cap
//!     SHA-256: 3f1c…
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use std::path::Path;

use crate::package::manifest::Manifest;
use crate::package::metadata::Metadata;
use crate::package::routes::Routes;
use crate::package::storage::Storage;
use crate::package::{LoadType, Package};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Section header with an item count, pluralized.
///
/// ```text
/// Content (3 files)
/// Datasets (1)
/// ```
fn section_header(title: &str, count: usize, noun: Option<(&str, &str)>) -> String {
    match noun {
        Some((one, many)) => {
            let word = if count == 1 { one } else { many };
            format!("{title} ({count} {word})")
        }
        None => format!("{title} ({count})"),
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Package identity plus description and dependencies.
pub fn format_metadata(metadata: &Metadata) -> Vec<String> {
    let mut lines = vec![format!("{} {}", metadata.name, metadata.version)];
    if let Some(description) = &metadata.description {
        lines.push(format!("{}Description: {}", indent(1), description));
    }
    for dep in &metadata.dependencies {
        lines.push(format!("{}Depends: {} {}", indent(1), dep.name, dep.version));
    }
    lines
}

pub fn format_manifest(manifest: &Manifest) -> Vec<String> {
    let entries = manifest.entries();
    let mut lines = vec![section_header(
        "Content",
        entries.len(),
        Some(("file", "files")),
    )];
    for (i, entry) in entries.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), entry.file));
        lines.push(format!("{}Type: {}", indent(1), entry.mime));
    }
    lines
}

pub fn format_storage(storage: &Storage) -> Vec<String> {
    let datasets = storage.datasets();
    let mut lines = vec![section_header("Datasets", datasets.len(), None)];
    for (i, dataset) in datasets.iter().enumerate() {
        let config = dataset.config();
        lines.push(format!("{} {}", format_index(i + 1), config.name));
        lines.push(format!(
            "{}Source: {} ({})",
            indent(1),
            config.source,
            config.format
        ));
        if let Some(schema) = &config.schema {
            lines.push(format!("{}Schema: {}", indent(1), schema));
        }
    }
    lines
}

/// One line per route, in canonical path order.
pub fn format_routes(routes: &Routes) -> Vec<String> {
    let mut lines = vec![section_header("Routes", routes.len(), None)];
    lines.extend(
        routes
            .iter()
            .map(|route| format!("{} → {}", route.path, route.target)),
    );
    lines
}

// ============================================================================
// Whole-package views
// ============================================================================

fn source_line(package: &Package) -> String {
    let kind = match package.load_type() {
        LoadType::Directory => "directory",
        LoadType::Archive => "archive",
    };
    format!(
        "{}Source: {} ({})",
        indent(1),
        package.original_path().display(),
        kind
    )
}

/// Full inventory: identity, content, datasets and routes.
pub fn format_info(package: &Package) -> Vec<String> {
    let mut lines = format_metadata(package.metadata());
    lines.push(source_line(package));
    lines.push(String::new());
    lines.extend(format_manifest(package.manifest()));
    lines.push(String::new());
    lines.extend(format_storage(package.storage()));
    lines.push(String::new());
    lines.extend(format_routes(package.routes()));
    lines
}

/// Summary printed after a successful `check`.
///
/// ```text
/// data_package 0.1.0 is valid
///     3 files, 1 dataset, 6 routes
/// ```
pub fn format_check(package: &Package) -> Vec<String> {
    let metadata = package.metadata();
    let files = package.manifest().entries().len();
    let datasets = package.storage().datasets().len();
    let routes = package.routes().len();
    vec![
        format!("{} {} is valid", metadata.name, metadata.version),
        format!(
            "{}{} {}, {} {}, {} {}",
            indent(1),
            files,
            if files == 1 { "file" } else { "files" },
            datasets,
            if datasets == 1 { "dataset" } else { "datasets" },
            routes,
            if routes == 1 { "route" } else { "routes" },
        ),
    ]
}

pub fn format_pack_output(metadata: &Metadata, archive: &Path, digest: &str) -> Vec<String> {
    vec![
        format!(
            "Packed {} {} → {}",
            metadata.name,
            metadata.version,
            archive.display()
        ),
        format!("{}SHA-256: {}", indent(1), digest),
    ]
}

pub fn format_unpack_output(archive: &Path, dest: &Path, entries: usize) -> Vec<String> {
    vec![format!(
        "Unpacked {} → {} ({} {})",
        archive.display(),
        dest.display(),
        entries,
        if entries == 1 { "entry" } else { "entries" }
    )]
}

pub fn print_metadata(metadata: &Metadata) {
    print_lines(format_metadata(metadata));
}

pub fn print_manifest(manifest: &Manifest) {
    print_lines(format_manifest(manifest));
}

pub fn print_storage(storage: &Storage) {
    print_lines(format_storage(storage));
}

pub fn print_routes(routes: &Routes) {
    print_lines(format_routes(routes));
}

pub fn print_info(package: &Package) {
    print_lines(format_info(package));
}

pub fn print_check(package: &Package) {
    print_lines(format_check(package));
}

pub fn print_pack_output(metadata: &Metadata, archive: &Path, digest: &str) {
    print_lines(format_pack_output(metadata, archive, digest));
}

pub fn print_unpack_output(archive: &Path, dest: &Path, entries: usize) {
    print_lines(format_unpack_output(archive, dest, entries));
}
