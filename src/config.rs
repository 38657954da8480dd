//! CLI configuration module.
//!
//! Handles loading and validating `capsium.toml`. The file is optional: stock
//! defaults apply when it is missing, and a present file only needs the keys it
//! wants to override. Package documents themselves are never configured here;
//! this only shapes how the command-line tool behaves.
//!
//! ## Config File Location
//!
//! `capsium.toml` is read from the current directory unless `--config` names
//! another file:
//!
//! ```text
//! workspace/
//! ├── capsium.toml          # optional
//! ├── my_package/
//! │   ├── metadata.json
//! │   └── content/
//! └── dist/                 # e.g. pack.output_dir = "dist"
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! [pack]
//! output_dir = "."          # Where `pack` writes <name>-<version>.cap
//! force = false             # Overwrite an existing archive
//! ```
//!
//! Unknown keys are rejected to catch typos early. Command-line flags win over
//! config values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "capsium.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Tool configuration loaded from `capsium.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapsiumConfig {
    /// Archive creation settings.
    pub pack: PackConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackConfig {
    /// Directory receiving packed archives.
    pub output_dir: PathBuf,
    /// Overwrite an existing archive instead of failing.
    pub force: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            force: false,
        }
    }
}

impl PackConfig {
    /// A command-line `--force`/`--no-force` wins over the configured value.
    pub fn resolve_force(&self, flag: Option<bool>) -> bool {
        flag.unwrap_or(self.force)
    }
}

impl CapsiumConfig {
    /// Validate config values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pack.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "pack.output_dir must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate config text.
pub fn parse_config(text: &str) -> Result<CapsiumConfig, ConfigError> {
    let config: CapsiumConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// With an explicit path the file must exist. Without one, `capsium.toml` in
/// the current directory is used if present, stock defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<CapsiumConfig, ConfigError> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let default = Path::new(CONFIG_FILE);
            if !default.exists() {
                tracing::debug!("no {CONFIG_FILE} found, using stock defaults");
                return Ok(CapsiumConfig::default());
            }
            default
        }
    };
    let config = parse_config(&fs::read_to_string(path)?)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Returns a fully-commented stock `capsium.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Capsium Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# This file is read from the current directory, or from the path given
# with --config. Command-line flags override these values.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Packing
# ---------------------------------------------------------------------------
[pack]
# Directory that receives <name>-<version>.cap archives.
output_dir = "."

# Replace an existing archive of the same name instead of failing.
force = false
"##
}
