//! Configuration loader.
//!
//! Loads and parses the harness configuration from disk and expands `${VAR}`
//! references in program paths and fixture URLs.

use crate::env::{ExpandError, Expander};
use crate::schema::HarnessConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported file format: {0} (expected .yaml, .yml, or .toml)")]
    UnsupportedFormat(String),

    #[error("in '{field}': {source}")]
    Interpolation {
        field: String,
        #[source]
        source: ExpandError,
    },
}

/// Configuration file names looked up in a directory, in order.
pub const CONFIG_FILENAMES: [&str; 3] = ["bmtest.yaml", "bmtest.yml", "bmtest.toml"];

/// Load a configuration from a file path and expand `${VAR}` references.
pub fn load_config(path: &Path) -> Result<HarnessConfig, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: HarnessConfig = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&contents)?,
        "toml" => toml::from_str(&contents)?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };
    expand_config(config)
}

/// Find the configuration file in `dir`, if any.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration from `dir`.
///
/// Returns the defaults if no configuration file exists, `Err` if one exists
/// but is invalid.
pub fn load_config_from_dir(dir: &Path) -> Result<HarnessConfig, LoadError> {
    match find_config(dir) {
        Some(path) => load_config(&path),
        None => expand_config(HarnessConfig::default()),
    }
}

/// Expand `${VAR}` in program paths and fixture URLs.
///
/// Variables from the configuration's own `env` map take precedence over
/// the host environment.
pub fn expand_config(mut config: HarnessConfig) -> Result<HarnessConfig, LoadError> {
    let env = config.env.clone();
    let expander = Expander::with_overrides(&env);
    let expand = |field: &str, value: &str| {
        expander
            .expand(value)
            .map_err(|source| LoadError::Interpolation {
                field: field.to_string(),
                source,
            })
    };

    config.tool = expand("tool", &config.tool)?;
    config.git = expand("git", &config.git)?;
    config.validator.program = expand("validator.program", &config.validator.program)?;
    for (i, fixture) in config.fixtures.iter_mut().enumerate() {
        fixture.url = expand(&format!("fixtures[{i}].url"), &fixture.url)?;
    }
    Ok(config)
}
