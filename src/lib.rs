//! # Capsium
//!
//! Load, validate, inspect, and archive Capsium content packages.
//!
//! A package bundles static web content with optional datasets and four JSON
//! documents that describe them. It lives either as a directory or as a `.cap`
//! zip archive of that directory:
//!
//! ```text
//! my_package/
//! ├── metadata.json     # identity: name, version, dependencies
//! ├── manifest.json     # every file under content/ with its media type
//! ├── routes.json       # URL path → content file or dataset
//! ├── storage.json      # datasets under data/, their formats and schemas
//! ├── content/
//! └── data/
//! ```
//!
//! # Architecture: Load → Inspect → Pack
//!
//! ```text
//! 1. Load      dir or .cap  →  Package        (documents read, or generated from disk)
//! 2. Inspect   Package      →  stdout         (output::format_*)
//! 3. Pack      Package      →  <name>-<version>.cap
//! ```
//!
//! Loading never writes to the package. Documents missing on disk are generated
//! in memory from the `content/` and `data/` trees, deterministically, and are
//! only written by an explicit [`package::Package::solidify`] or as part of
//! packing, which works on a scratch copy.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`package`] | The `Package` aggregate and its documents: metadata, manifest, storage, routes |
//! | [`package::dataset`] | Dataset formats (YAML, JSON, CSV, TSV, SQLite), loaders, JSON Schema validation |
//! | [`packager`] | Package → `.cap` archive and back, via a scratch copy and atomic rename |
//! | [`archive`] | Zip container I/O with path-traversal protection |
//! | [`config`] | Optional `capsium.toml` for the command-line tool |
//! | [`output`] | CLI output formatting: pure `format_*` functions plus `print_*` wrappers |
//!
//! # Design Decisions
//!
//! ## Document Adoption Over Regeneration
//!
//! A document present on disk is taken as written. The manifest is not
//! re-scanned, routes are not re-derived. This makes an unpacked archive load
//! to exactly the state that was packed, and lets authors hand-edit routes.
//! Route validation still runs on every load, so a hand-written route to a
//! missing file fails fast.
//!
//! ## Canonical Ordering
//!
//! Manifest entries, routes, and datasets are always written sorted by path or
//! name. Two solidifications of the same tree produce byte-identical documents,
//! which keeps archives reproducible and diffs readable.
//!
//! ## No Logging From the Library
//!
//! The library emits `tracing` events (debug for progress, warn for overwritten
//! routes and archives) and never installs a subscriber or prints. The binary
//! decides where those events go.

pub mod archive;
pub mod config;
pub mod output;
pub mod package;
pub mod packager;

#[cfg(test)]
pub(crate) mod test_helpers;
