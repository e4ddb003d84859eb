// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a pipeline file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading pipeline file");
    let contents = fs::read_to_string(path)?;
    parse(&contents)
}

/// Load a pipeline file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - an empty task set,
///   - unknown or self `after` references,
///   - cycles,
///   - malformed fan-out stages.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Parse and validate a pipeline held in memory.
pub fn load_from_str(contents: &str) -> Result<ConfigFile> {
    let raw_config = parse(contents)?;
    ConfigFile::try_from(raw_config)
}

fn parse(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// `Taskflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskflow.toml")
}
