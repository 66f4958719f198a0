//! Schema definitions for the harness configuration file.
//!
//! The configuration names the tool under test, the auxiliary programs the
//! scenarios call (version-control client, external validator) and the list
//! of external repositories used as regression fixtures. It is written in
//! YAML or TOML and validated against these types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default wall-clock limit per invocation, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Root document for `bmtest.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HarnessConfig {
    /// Schema version (must match crate major version).
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path or name of the tool under test. Supports `${VAR}` interpolation.
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Version-control client used to clone fixtures.
    #[serde(default = "default_git")]
    pub git: String,

    /// External build-configuration front-end validating generated scripts.
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Wall-clock limit in seconds for every invocation. 0 disables the limit.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Run scenarios one after another instead of in parallel (default: false).
    #[serde(default)]
    pub serial: bool,

    /// Whether spawned processes inherit the host environment (default: true).
    #[serde(default = "default_true")]
    pub inherit_env: bool,

    /// Extra environment variables for every spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Directory for sandboxes. If set, sandboxes are created here instead of system temp.
    /// Use "local" for `.bmtest/<timestamp>/`, or specify a custom path.
    /// Sandboxes are removed after each scenario either way.
    #[serde(default)]
    pub sandbox_dir: Option<SandboxDir>,

    /// Independently maintained repositories used as regression fixtures.
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            tool: default_tool(),
            git: default_git(),
            validator: ValidatorConfig::default(),
            timeout: default_timeout(),
            serial: false,
            inherit_env: true,
            env: HashMap::new(),
            sandbox_dir: None,
            fixtures: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_tool() -> String {
    "build_master".to_string()
}

fn default_git() -> String {
    "git".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// How the external validator is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidatorConfig {
    /// The validator binary. Supports `${VAR}` interpolation.
    #[serde(default = "default_validator_program")]
    pub program: String,

    /// Arguments passed before any directory flag.
    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,

    /// Flag used to point the validator at the project, e.g. `--directory`.
    /// When unset the validator runs inside the project directory instead.
    #[serde(default)]
    pub directory_flag: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            program: default_validator_program(),
            args: default_validator_args(),
            directory_flag: None,
        }
    }
}

fn default_validator_program() -> String {
    "meson".to_string()
}

fn default_validator_args() -> Vec<String> {
    vec!["setup".to_string(), "build".to_string()]
}

/// Directory configuration for sandboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(from = "String", into = "String")]
pub enum SandboxDir {
    /// Use `.bmtest/<timestamp>/` in the current directory.
    Local,
    /// Use a specific path for sandboxes.
    Path(PathBuf),
}

impl From<String> for SandboxDir {
    fn from(s: String) -> Self {
        if s == "local" {
            SandboxDir::Local
        } else {
            SandboxDir::Path(PathBuf::from(s))
        }
    }
}

impl From<SandboxDir> for String {
    fn from(dir: SandboxDir) -> String {
        match dir {
            SandboxDir::Local => "local".to_string(),
            SandboxDir::Path(p) => p.display().to_string(),
        }
    }
}

/// An external repository cloned and regenerated as a regression fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Fixture {
    /// Clone URL. Supports `${VAR}` interpolation.
    pub url: String,

    /// Short name used in scenario names; derived from the URL when omitted.
    #[serde(default)]
    pub name: Option<String>,
}

impl Fixture {
    /// The configured name, or the last URL segment without `.git`.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let trimmed = self.url.trim_end_matches('/');
        let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
        last.strip_suffix(".git").unwrap_or(last).to_string()
    }
}

/// Generate the JSON Schema for the harness configuration file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(HarnessConfig)
}
